use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, Effect, FocusPane, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<Option<Effect>> {
    let effect = match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => {
            handle_mouse(app, mouse);
            None
        }
        AppEvent::Resize(_, _) => None,
        AppEvent::Tick => {
            app.tick_animation();
            None
        }
    };
    Ok(effect)
}

fn handle_key(app: &mut App, key: KeyEvent) -> Option<Effect> {
    // Works in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return None;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) -> Option<Effect> {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Prompt => FocusPane::Chat,
                FocusPane::Chat => FocusPane::Preview,
                FocusPane::Preview => FocusPane::Prompt,
            };
        }

        KeyCode::Enter | KeyCode::Char('i') => {
            if matches!(app.focus, FocusPane::Prompt | FocusPane::Chat) {
                app.input_mode = InputMode::Editing;
            }
        }

        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Preview => app.preview_scroll_down(),
            FocusPane::Chat => app.chat_scroll_down(),
            FocusPane::Prompt => {}
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Preview => app.preview_scroll_up(),
            FocusPane::Chat => app.chat_scroll_up(),
            FocusPane::Prompt => {}
        },

        // Half-page scroll in the preview
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if app.focus == FocusPane::Preview {
                app.preview_scroll_half_page_down();
            }
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if app.focus == FocusPane::Preview {
                app.preview_scroll_half_page_up();
            }
        }

        _ => {}
    }
    None
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) -> Option<Effect> {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            None
        }
        KeyCode::Enter => {
            let effect = match app.focus {
                FocusPane::Prompt => app.submit_campaign_prompt(),
                FocusPane::Chat => app.submit_chat_message(),
                FocusPane::Preview => None,
            };
            if effect.is_some() {
                app.input_mode = InputMode::Normal;
            }
            effect
        }
        _ => {
            edit_focused_input(app, key);
            None
        }
    }
}

fn edit_focused_input(app: &mut App, key: KeyEvent) {
    let (input, cursor) = match app.focus {
        FocusPane::Prompt => (&mut app.prompt_input, &mut app.prompt_cursor),
        FocusPane::Chat => (&mut app.chat_input, &mut app.chat_cursor),
        FocusPane::Preview => return,
    };

    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(input, *cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = input.chars().count();
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(input, *cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            *cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = input.chars().count();
            *cursor = (*cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            *cursor = 0;
        }
        KeyCode::End => {
            *cursor = input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(input, *cursor);
            input.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_preview = app
        .preview_area
        .map(|r| point_in_rect(x, y, r))
        .unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            for _ in 0..3 {
                if in_chat {
                    app.chat_scroll_down();
                } else if in_preview {
                    app.preview_scroll_down();
                }
            }
        }
        MouseEventKind::ScrollUp => {
            for _ in 0..3 {
                if in_chat {
                    app.chat_scroll_up();
                } else if in_preview {
                    app.preview_scroll_up();
                }
            }
        }
        _ => {}
    }
}
