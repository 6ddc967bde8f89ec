use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
};

use crate::app::{App, ChatRole, FocusPane, InputMode, Phase};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area);

    // Body: prompt + chat on the left, status + preview on the right
    let [left_area, right_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
            .areas(body_area);

    let [prompt_area, chat_area, chat_input_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(left_area);

    render_prompt_input(app, frame, prompt_area);
    render_chat(app, frame, chat_area);
    render_chat_input(app, frame, chat_input_area);

    let [status_area, preview_area] =
        Layout::vertical([Constraint::Length(2), Constraint::Min(0)]).areas(right_area);

    render_status(app, frame, status_area);
    render_preview(app, frame, preview_area);

    render_footer(app, frame, footer_area);
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(
            " Campaign Studio ",
            Style::default().fg(Color::Cyan).bold(),
        ),
        Span::styled(
            "AI email campaigns ",
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " EDIT ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Normal => {
            let mut hints = vec![
                Span::styled(" Tab ", key_style),
                Span::styled(" focus ", label_style),
            ];
            match app.focus {
                FocusPane::Prompt => hints.extend(vec![
                    Span::styled(" i/Enter ", key_style),
                    Span::styled(" edit brief ", label_style),
                ]),
                FocusPane::Chat => hints.extend(vec![
                    Span::styled(" i/Enter ", key_style),
                    Span::styled(" ask ", label_style),
                    Span::styled(" j/k ", key_style),
                    Span::styled(" scroll ", label_style),
                ]),
                FocusPane::Preview => hints.extend(vec![
                    Span::styled(" j/k ", key_style),
                    Span::styled(" scroll ", label_style),
                ]),
            }
            hints.extend(vec![
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]);
            hints
        }
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(
                if app.focus == FocusPane::Prompt {
                    " generate "
                } else {
                    " send "
                },
                label_style,
            ),
            Span::styled(" Esc ", key_style),
            Span::styled(" done ", label_style),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    spans.extend(hints);

    let footer = Paragraph::new(Line::from(spans));
    frame.render_widget(footer, area);
}

/// Bordered single-line input with horizontal scrolling and cursor tracking.
fn render_line_input(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    input: &str,
    cursor: usize,
    border_color: Color,
    show_cursor: bool,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;

    // Keep the cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = input.chars().skip(scroll_offset).take(inner_width).collect();

    let widget = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(widget, area);

    if show_cursor {
        let cursor_x = (cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_prompt_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Prompt;
    let editing = focused && app.input_mode == InputMode::Editing;

    let border_color = if app.is_generating() {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let title = if app.is_generating() {
        " Campaign brief (generating...) "
    } else {
        " Campaign brief (Enter to generate) "
    };

    render_line_input(
        frame,
        area,
        title,
        &app.prompt_input,
        app.prompt_cursor,
        border_color,
        editing,
    );
}

fn render_chat_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Chat;
    let editing = focused && app.input_mode == InputMode::Editing;

    let border_color = if !app.chat_available() || app.phase == Phase::Chatting {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let title = if !app.chat_available() {
        " Ask (chat unavailable) "
    } else if app.phase == Phase::Chatting {
        " Ask (waiting for reply...) "
    } else {
        " Ask (Enter to send) "
    };

    render_line_input(
        frame,
        area,
        title,
        &app.chat_input,
        app.chat_cursor,
        border_color,
        editing,
    );
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Marketing Assistant ");

    // Store the panel geometry for wheel hit-testing and scroll estimation
    app.chat_area = Some(area);
    app.chat_area_height = area.height.saturating_sub(2);
    app.chat_area_width = area.width.saturating_sub(2);

    if !app.chat_available() {
        let placeholder = Paragraph::new(
            "Chat is unavailable. Set GEMINI_API_KEY and restart to talk to the assistant.",
        )
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true })
        .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    let last_idx = app.chat_messages.len().saturating_sub(1);

    for (idx, msg) in app.chat_messages.iter().enumerate() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(msg.content.as_str()));
                lines.push(Line::default());
            }
            ChatRole::Model => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                if msg.content.is_empty() && idx == last_idx && app.phase == Phase::Chatting {
                    // Streaming placeholder with nothing delivered yet
                    let dots = ".".repeat((app.animation_frame as usize) + 1);
                    lines.push(Line::from(Span::styled(
                        format!("Thinking{}", dots),
                        Style::default()
                            .fg(Color::DarkGray)
                            .add_modifier(Modifier::ITALIC),
                    )));
                } else {
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
                lines.push(Line::default());
            }
        }
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let dots = ".".repeat((app.animation_frame as usize) + 1);

    let line = if let Some(error) = &app.error {
        Line::from(Span::styled(
            error.as_str(),
            Style::default().fg(Color::Red),
        ))
    } else {
        match app.phase {
            Phase::GeneratingText => Line::from(Span::styled(
                format!("Drafting subject and body{}", dots),
                Style::default().fg(Color::Yellow),
            )),
            Phase::GeneratingImage => Line::from(Span::styled(
                format!("Rendering the hero image{}", dots),
                Style::default().fg(Color::Yellow),
            )),
            Phase::Chatting => Line::from(Span::styled(
                format!("The assistant is replying{}", dots),
                Style::default().fg(Color::DarkGray),
            )),
            Phase::Idle | Phase::Error => Line::from(Span::styled(
                "Ready.",
                Style::default().fg(Color::DarkGray),
            )),
        }
    };

    let status = Paragraph::new(line).wrap(Wrap { trim: true });
    frame.render_widget(status, area);
}

fn render_preview(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Preview;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Campaign Preview ");

    let inner_area = block.inner(area);
    app.preview_area = Some(area);
    app.preview_height = inner_area.height;

    let Some(campaign) = &app.campaign else {
        let hint = if app.is_generating() {
            "Generating your campaign..."
        } else {
            "Describe your product, audience, and goal on the left, \
             then press Enter to generate a campaign."
        };
        let placeholder = Paragraph::new(hint)
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true })
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(vec![
        Span::styled("Subject: ", Style::default().fg(Color::Yellow).bold()),
        Span::styled(
            campaign.subject.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ]));
    lines.push(Line::default());

    for line in campaign.body.lines() {
        lines.push(parse_markdown_line(line));
    }
    lines.push(Line::default());

    match &campaign.image_url {
        Some(reference) => lines.push(Line::from(Span::styled(
            image_summary(reference),
            Style::default().fg(Color::Green),
        ))),
        None if app.phase == Phase::GeneratingImage => {
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("[hero image pending{}]", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }
        None => lines.push(Line::from(Span::styled(
            "[no hero image]",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    app.preview_total_lines = lines.len() as u16;

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.preview_scroll, 0));

    frame.render_widget(paragraph, area);

    if app.preview_total_lines > app.preview_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state = ScrollbarState::new(app.preview_total_lines as usize)
            .position(app.preview_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

/// One-line summary of the embeddable image reference; the TUI cannot show
/// the bitmap itself.
fn image_summary(reference: &str) -> String {
    let kind = reference
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .unwrap_or("image");
    format!("[hero image attached: {}, {} KiB]", kind, reference.len() / 1024)
}
