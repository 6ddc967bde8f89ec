use anyhow::Result;
use tokio::sync::mpsc;

mod app;
mod config;
mod error;
mod gemini;
mod handler;
mod tui;
mod ui;

use app::{AdapterEvent, App, Effect};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|_| Config::new());
    let mut app = App::new(&config);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = tui::EventHandler::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let effect = tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event)?,
            Some(adapter_event) = rx.recv() => app.apply(adapter_event),
        };

        if let Some(effect) = effect {
            run_effect(app, effect, &tx);
        }
    }

    Ok(())
}

/// Execute an effect by spawning the adapter call it describes; the task
/// reports back over the channel the main loop listens on.
fn run_effect(app: &App, effect: Effect, tx: &mpsc::UnboundedSender<AdapterEvent>) {
    let Some(client) = app.gemini.clone() else {
        return;
    };

    match effect {
        Effect::GenerateText { generation, prompt } => {
            let tx = tx.clone();
            tokio::spawn(async move {
                let event = match client.generate_campaign_content(&prompt).await {
                    Ok(content) => AdapterEvent::TextReady { generation, content },
                    Err(e) => AdapterEvent::GenerationFailed {
                        generation,
                        message: e.to_string(),
                    },
                };
                let _ = tx.send(event);
            });
        }
        Effect::GenerateImage { generation, prompt } => {
            let tx = tx.clone();
            tokio::spawn(async move {
                let event = match client.generate_image(&prompt).await {
                    Ok(image_url) => AdapterEvent::ImageReady {
                        generation,
                        image_url,
                    },
                    Err(e) => AdapterEvent::GenerationFailed {
                        generation,
                        message: e.to_string(),
                    },
                };
                let _ = tx.send(event);
            });
        }
        Effect::StreamChat { contents } => {
            let tx = tx.clone();
            tokio::spawn(async move {
                let fragments = tx.clone();
                let result = client
                    .stream_message(&contents, move |fragment| {
                        let _ = fragments.send(AdapterEvent::ChatFragment(fragment));
                    })
                    .await;

                let event = match result {
                    Ok(reply) => AdapterEvent::ChatCompleted(reply),
                    Err(e) => AdapterEvent::ChatFailed(e.to_string()),
                };
                let _ = tx.send(event);
            });
        }
    }
}
