use ratatui::layout::Rect;

use crate::config::Config;
use crate::error::AiError;
use crate::gemini::{CampaignContent, ChatSession, Content, GeminiClient};

pub const GREETING: &str =
    "Hello! I can help you refine your campaign or answer any questions. \
     How can I assist you today?";

/// The single current state of the application; drives which controls are
/// live and what the status line shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    GeneratingText,
    GeneratingImage,
    Chatting,
    Error,
}

/// The generated subject/body/image triple. Replaced wholesale on each
/// generation request; the image is filled in as a second step.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub subject: String,
    pub body: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Prompt,
    Chat,
    Preview,
}

/// Async work the state machine wants performed. The runtime loop executes
/// these by spawning adapter calls; results come back as `AdapterEvent`s.
#[derive(Debug)]
pub enum Effect {
    GenerateText { generation: u64, prompt: String },
    GenerateImage { generation: u64, prompt: String },
    StreamChat { contents: Vec<Content> },
}

/// Results reported by spawned adapter calls.
#[derive(Debug)]
pub enum AdapterEvent {
    TextReady { generation: u64, content: CampaignContent },
    ImageReady { generation: u64, image_url: String },
    GenerationFailed { generation: u64, message: String },
    ChatFragment(String),
    ChatCompleted(String),
    ChatFailed(String),
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub phase: Phase,
    pub campaign: Option<Campaign>,
    pub chat_messages: Vec<ChatMessage>,
    pub error: Option<String>,

    // Adapter and the singleton chat session, owned here rather than by
    // any global.
    pub gemini: Option<GeminiClient>,
    chat: Option<ChatSession>,
    pending_chat_turn: Option<String>,

    // Fence for overlapping generation requests: adapter events carrying a
    // stale generation are dropped.
    generation: u64,

    // Input state
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub prompt_input: String,
    pub prompt_cursor: usize,
    pub chat_input: String,
    pub chat_cursor: usize,

    // Scroll state
    pub chat_scroll: u16,
    pub chat_area_height: u16,
    pub chat_area_width: u16,
    pub preview_scroll: u16,
    pub preview_height: u16,
    pub preview_total_lines: u16,

    // Animation state
    pub animation_frame: u8,

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub preview_area: Option<Rect>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self::with_adapter(GeminiClient::from_env(config))
    }

    fn with_adapter(adapter: Result<GeminiClient, AiError>) -> Self {
        let mut app = Self {
            should_quit: false,
            phase: Phase::Idle,
            campaign: None,
            chat_messages: Vec::new(),
            error: None,

            gemini: None,
            chat: None,
            pending_chat_turn: None,

            generation: 0,

            input_mode: InputMode::Normal,
            focus: FocusPane::Prompt,
            prompt_input: String::new(),
            prompt_cursor: 0,
            chat_input: String::new(),
            chat_cursor: 0,

            chat_scroll: 0,
            chat_area_height: 0,
            chat_area_width: 0,
            preview_scroll: 0,
            preview_height: 0,
            preview_total_lines: 0,

            animation_frame: 0,

            chat_area: None,
            preview_area: None,
        };

        match adapter {
            Ok(client) => {
                app.chat = Some(client.start_chat());
                app.gemini = Some(client);
                app.chat_messages.push(ChatMessage {
                    role: ChatRole::Model,
                    content: GREETING.to_string(),
                });
            }
            Err(e) => {
                app.error = Some(e.to_string());
                app.phase = Phase::Error;
            }
        }

        app
    }

    /// Whether a campaign generation stage is in flight.
    pub fn is_generating(&self) -> bool {
        matches!(self.phase, Phase::GeneratingText | Phase::GeneratingImage)
    }

    /// Whether any remote operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.is_generating() || self.phase == Phase::Chatting
    }

    pub fn chat_available(&self) -> bool {
        self.chat.is_some()
    }

    pub fn chat_session(&self) -> Option<&ChatSession> {
        self.chat.as_ref()
    }

    /// Intent: generate a campaign from the prompt input. Valid from
    /// Idle/Error with a non-blank prompt; clears the previous campaign
    /// and error.
    pub fn submit_campaign_prompt(&mut self) -> Option<Effect> {
        let prompt = self.prompt_input.trim().to_string();
        if prompt.is_empty() {
            // Rejected locally: the phase stays, only the message changes.
            self.error = Some("Please enter a prompt for your campaign.".to_string());
            return None;
        }
        if self.is_busy() {
            return None;
        }
        if self.gemini.is_none() {
            self.error =
                Some("The AI client is not configured. Set GEMINI_API_KEY and restart.".to_string());
            return None;
        }

        self.generation += 1;
        self.phase = Phase::GeneratingText;
        self.error = None;
        self.campaign = None;
        self.preview_scroll = 0;

        Some(Effect::GenerateText {
            generation: self.generation,
            prompt,
        })
    }

    /// Intent: send the chat input to the assistant. Blank input or a
    /// missing session is silently ignored.
    pub fn submit_chat_message(&mut self) -> Option<Effect> {
        let message = self.chat_input.trim().to_string();
        if message.is_empty() {
            return None;
        }
        let Some(session) = &self.chat else {
            return None;
        };
        if self.is_busy() {
            return None;
        }

        self.phase = Phase::Chatting;
        self.error = None;
        self.chat_messages.push(ChatMessage {
            role: ChatRole::User,
            content: message.clone(),
        });
        // Placeholder the stream fills in; the only message ever mutated
        // in place.
        self.chat_messages.push(ChatMessage {
            role: ChatRole::Model,
            content: String::new(),
        });

        let contents = session.contents_with(&message);
        self.pending_chat_turn = Some(message);
        self.chat_input.clear();
        self.chat_cursor = 0;
        self.scroll_chat_to_bottom();

        Some(Effect::StreamChat { contents })
    }

    /// Fold a spawned adapter call's result back into the state. May
    /// return a follow-up effect (the image stage after the text stage).
    pub fn apply(&mut self, event: AdapterEvent) -> Option<Effect> {
        match event {
            AdapterEvent::TextReady {
                generation,
                content,
            } => {
                if generation != self.generation || self.phase != Phase::GeneratingText {
                    return None;
                }
                self.campaign = Some(Campaign {
                    subject: content.subject,
                    body: content.body,
                    image_url: None,
                });
                self.phase = Phase::GeneratingImage;
                Some(Effect::GenerateImage {
                    generation,
                    prompt: content.image_prompt,
                })
            }
            AdapterEvent::ImageReady {
                generation,
                image_url,
            } => {
                if generation != self.generation || self.phase != Phase::GeneratingImage {
                    return None;
                }
                if let Some(campaign) = &mut self.campaign {
                    campaign.image_url = Some(image_url);
                }
                self.phase = Phase::Idle;
                None
            }
            AdapterEvent::GenerationFailed {
                generation,
                message,
            } => {
                if generation != self.generation || !self.is_generating() {
                    return None;
                }
                // No rollback: a campaign that lost only its image keeps
                // its text.
                self.error = Some(format!("Failed to generate campaign. {}", message));
                self.phase = Phase::Error;
                None
            }
            AdapterEvent::ChatFragment(text) => {
                if self.phase != Phase::Chatting {
                    return None;
                }
                if let Some(last) = self.chat_messages.last_mut() {
                    if last.role == ChatRole::Model {
                        last.content.push_str(&text);
                    }
                }
                self.scroll_chat_to_bottom();
                None
            }
            AdapterEvent::ChatCompleted(reply) => {
                if self.phase != Phase::Chatting {
                    return None;
                }
                if let (Some(session), Some(user)) =
                    (self.chat.as_mut(), self.pending_chat_turn.take())
                {
                    session.record_turn(&user, &reply);
                }
                self.phase = Phase::Idle;
                None
            }
            AdapterEvent::ChatFailed(message) => {
                if self.phase != Phase::Chatting {
                    return None;
                }
                self.pending_chat_turn = None;
                let notice = format!("Sorry, I encountered an error. {}", message);
                self.chat_messages.push(ChatMessage {
                    role: ChatRole::Model,
                    content: notice.clone(),
                });
                self.error = Some(notice);
                self.phase = Phase::Idle;
                self.scroll_chat_to_bottom();
                None
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Preview scrolling
    pub fn preview_scroll_down(&mut self) {
        if self.preview_scroll < self.preview_total_lines.saturating_sub(self.preview_height) {
            self.preview_scroll = self.preview_scroll.saturating_add(1);
        }
    }

    pub fn preview_scroll_up(&mut self) {
        self.preview_scroll = self.preview_scroll.saturating_sub(1);
    }

    pub fn preview_scroll_half_page_down(&mut self) {
        let half_page = self.preview_height / 2;
        let max_scroll = self.preview_total_lines.saturating_sub(self.preview_height);
        self.preview_scroll = (self.preview_scroll + half_page).min(max_scroll);
    }

    pub fn preview_scroll_half_page_up(&mut self) {
        let half_page = self.preview_height / 2;
        self.preview_scroll = self.preview_scroll.saturating_sub(half_page);
    }

    // Chat transcript scrolling
    pub fn chat_scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn chat_scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    /// Estimate the rendered height of the transcript and pin the view to
    /// its tail, so new fragments stay visible while streaming.
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use the actual chat width for wrap estimation, default if the
        // first frame has not been drawn yet.
        let wrap_width = if self.chat_area_width > 0 {
            self.chat_area_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in &self.chat_messages {
            total_lines += 1; // role line ("You:" or "AI:")
            for line in msg.content.lines() {
                // Character count, not byte length, for UTF-8 content.
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // blank line after message
        }

        if self.phase == Phase::Chatting {
            total_lines += 1; // thinking indicator
        }

        let visible_height = if self.chat_area_height > 0 {
            self.chat_area_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_app() -> App {
        App::with_adapter(Ok(GeminiClient::new("test-key", &Config::new())))
    }

    fn broken_app() -> App {
        App::with_adapter(Err(AiError::Initialization(
            "GEMINI_API_KEY is not set".to_string(),
        )))
    }

    fn coffee_content() -> CampaignContent {
        serde_json::from_str(
            r#"{
                "subject": "Brew a Better Tomorrow",
                "body": "Our beans are **planet-friendly**. Order today.",
                "imagePrompt": "a rustic coffee farm at sunrise"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_startup_seeds_greeting() {
        let app = ready_app();
        assert_eq!(app.phase, Phase::Idle);
        assert_eq!(app.chat_messages.len(), 1);
        assert_eq!(app.chat_messages[0].role, ChatRole::Model);
        assert!(app.chat_available());
        assert!(app.error.is_none());
    }

    #[test]
    fn test_failed_startup_disables_chat() {
        let mut app = broken_app();
        assert_eq!(app.phase, Phase::Error);
        assert!(app.chat_messages.is_empty());
        assert!(app.error.is_some());

        // Chat submissions are a no-op without a session.
        app.chat_input = "hello".to_string();
        assert!(app.submit_chat_message().is_none());
        assert!(app.chat_messages.is_empty());
    }

    #[test]
    fn test_blank_prompt_rejected_locally() {
        let mut app = ready_app();
        app.prompt_input = "   ".to_string();

        assert!(app.submit_campaign_prompt().is_none());
        assert_eq!(app.phase, Phase::Idle);
        assert!(app.error.is_some());
    }

    #[test]
    fn test_blank_chat_message_silently_ignored() {
        let mut app = ready_app();
        app.chat_input = " \t ".to_string();

        assert!(app.submit_chat_message().is_none());
        assert_eq!(app.phase, Phase::Idle);
        assert!(app.error.is_none());
        assert_eq!(app.chat_messages.len(), 1);
    }

    #[test]
    fn test_full_generation_flow() {
        let mut app = ready_app();
        app.prompt_input = "eco-friendly coffee brand".to_string();

        let Some(Effect::GenerateText { generation, prompt }) = app.submit_campaign_prompt()
        else {
            panic!("expected a text generation effect");
        };
        assert_eq!(generation, 1);
        assert_eq!(prompt, "eco-friendly coffee brand");
        assert_eq!(app.phase, Phase::GeneratingText);
        assert!(app.campaign.is_none());

        let Some(Effect::GenerateImage { generation, prompt }) = app.apply(AdapterEvent::TextReady {
            generation: 1,
            content: coffee_content(),
        }) else {
            panic!("expected an image generation effect");
        };
        assert_eq!(generation, 1);
        assert_eq!(prompt, "a rustic coffee farm at sunrise");
        assert_eq!(app.phase, Phase::GeneratingImage);
        let campaign = app.campaign.as_ref().unwrap();
        assert_eq!(campaign.subject, "Brew a Better Tomorrow");
        assert!(campaign.image_url.is_none());

        let follow_up = app.apply(AdapterEvent::ImageReady {
            generation: 1,
            image_url: "data:image/png;base64,aGVsbG8=".to_string(),
        });
        assert!(follow_up.is_none());
        assert_eq!(app.phase, Phase::Idle);
        let campaign = app.campaign.as_ref().unwrap();
        assert_eq!(
            campaign.image_url.as_deref(),
            Some("data:image/png;base64,aGVsbG8=")
        );
        assert!(app.error.is_none());
    }

    #[test]
    fn test_image_failure_keeps_generated_text() {
        let mut app = ready_app();
        app.prompt_input = "eco-friendly coffee brand".to_string();
        app.submit_campaign_prompt().unwrap();
        let _ = app.apply(AdapterEvent::TextReady {
            generation: 1,
            content: coffee_content(),
        });

        let _ = app.apply(AdapterEvent::GenerationFailed {
            generation: 1,
            message: "No image was generated.".to_string(),
        });

        assert_eq!(app.phase, Phase::Error);
        assert!(app.error.is_some());
        let campaign = app.campaign.as_ref().unwrap();
        assert_eq!(campaign.subject, "Brew a Better Tomorrow");
        assert!(campaign.image_url.is_none());
    }

    #[test]
    fn test_resubmit_from_error_clears_previous_state() {
        let mut app = ready_app();
        app.prompt_input = "coffee".to_string();
        app.submit_campaign_prompt().unwrap();
        let _ = app.apply(AdapterEvent::GenerationFailed {
            generation: 1,
            message: "boom".to_string(),
        });
        assert_eq!(app.phase, Phase::Error);

        app.prompt_input = "tea".to_string();
        let Some(Effect::GenerateText { generation, .. }) = app.submit_campaign_prompt() else {
            panic!("expected a text generation effect");
        };
        assert_eq!(generation, 2);
        assert_eq!(app.phase, Phase::GeneratingText);
        assert!(app.error.is_none());
    }

    #[test]
    fn test_stale_generation_events_are_dropped() {
        let mut app = ready_app();
        app.prompt_input = "coffee".to_string();
        app.submit_campaign_prompt().unwrap();
        let _ = app.apply(AdapterEvent::GenerationFailed {
            generation: 1,
            message: "timeout".to_string(),
        });

        app.prompt_input = "tea".to_string();
        app.submit_campaign_prompt().unwrap();

        // The first request resolves late; it must not clobber the newer one.
        let follow_up = app.apply(AdapterEvent::TextReady {
            generation: 1,
            content: coffee_content(),
        });
        assert!(follow_up.is_none());
        assert!(app.campaign.is_none());
        assert_eq!(app.phase, Phase::GeneratingText);
    }

    #[test]
    fn test_submissions_blocked_while_generating() {
        let mut app = ready_app();
        app.prompt_input = "coffee".to_string();
        app.submit_campaign_prompt().unwrap();

        assert!(app.submit_campaign_prompt().is_none());
        app.chat_input = "hello".to_string();
        assert!(app.submit_chat_message().is_none());
        assert_eq!(app.chat_messages.len(), 1);
    }

    #[test]
    fn test_chat_fragments_apply_in_order() {
        let mut app = ready_app();
        app.chat_input = "shorten the subject".to_string();

        let Some(Effect::StreamChat { contents }) = app.submit_chat_message() else {
            panic!("expected a chat stream effect");
        };
        assert_eq!(contents.len(), 1);
        assert_eq!(app.phase, Phase::Chatting);
        // Greeting, user turn, empty model placeholder.
        assert_eq!(app.chat_messages.len(), 3);
        assert_eq!(app.chat_messages[2].content, "");

        for (fragment, expected) in [("Hel", "Hel"), ("lo", "Hello"), ("!", "Hello!")] {
            assert!(app
                .apply(AdapterEvent::ChatFragment(fragment.to_string()))
                .is_none());
            assert_eq!(app.chat_messages[2].content, expected);
        }

        let _ = app.apply(AdapterEvent::ChatCompleted("Hello!".to_string()));
        assert_eq!(app.phase, Phase::Idle);
        assert_eq!(app.chat_messages[2].content, "Hello!");
        // The completed exchange is committed to the session.
        assert_eq!(app.chat_session().unwrap().turn_count(), 2);
    }

    #[test]
    fn test_chat_failure_keeps_partial_reply() {
        let mut app = ready_app();
        app.chat_input = "shorten the subject".to_string();
        app.submit_chat_message().unwrap();
        let _ = app.apply(AdapterEvent::ChatFragment("Hel".to_string()));

        let _ = app.apply(AdapterEvent::ChatFailed("connection reset".to_string()));

        assert_eq!(app.phase, Phase::Idle);
        // Partial placeholder retained, synthetic notice appended after it.
        assert_eq!(app.chat_messages[2].content, "Hel");
        let notice = &app.chat_messages[3];
        assert_eq!(notice.role, ChatRole::Model);
        assert!(notice.content.contains("connection reset"));
        assert!(app.error.is_some());
        // The failed turn is not committed to the session.
        assert_eq!(app.chat_session().unwrap().turn_count(), 0);
    }
}
