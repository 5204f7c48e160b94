use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::control::{ControlResponse, Controller, OperatorCommand, MENU_ACTIONS};
use crate::platform::telegram::{inbound_from, TelegramGateway};
use crate::relay::sources::SourceChannels;
use crate::relay::{Handled, Relay};

/// Shared application state
pub struct AppState {
    pub relay: Relay,
    pub controller: Controller,
    gateway: Arc<TelegramGateway>,
    restart: Notify,
    restart_requested: AtomicBool,
}

impl AppState {
    pub fn new(config: &Config, bot: Bot) -> Self {
        let sources = Arc::new(SourceChannels::new(
            config.relay.source_channels.iter().copied(),
        ));
        let gateway = Arc::new(TelegramGateway::new(
            bot,
            Duration::from_millis(config.relay.media_group_settle_ms),
        ));

        Self {
            relay: Relay::new(gateway.clone(), sources.clone(), &config.relay),
            controller: Controller::new(config.telegram.operator_id, sources),
            gateway,
            restart: Notify::new(),
            restart_requested: AtomicBool::new(false),
        }
    }

    /// Ask `run` to drain in-flight updates and return `RestartRequested`
    fn request_restart(&self) {
        self.restart_requested.store(true, Ordering::SeqCst);
        self.restart.notify_one();
    }
}

/// Why the bot stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped,
    RestartRequested,
}

/// Start the Telegram bot
pub async fn run(bot: Bot, state: Arc<AppState>) -> Result<RunOutcome> {
    info!("Starting Telegram bot...");

    let handler = dptree::entry()
        .branch(
            Update::filter_channel_post()
                .filter(is_from_source)
                .endpoint(handle_source_message),
        )
        .branch(
            Update::filter_message()
                .branch(dptree::filter(is_from_source).endpoint(handle_source_message))
                .branch(dptree::endpoint(handle_command)),
        )
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        // No per-chat queue: updates run concurrently, so later media-group members
        // are observed while the first member's handler waits for the rest.
        .distribution_function(|_| None::<std::convert::Infallible>)
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("bot"))
        .enable_ctrlc_handler()
        .build();

    // On restart, stop polling but let in-flight handlers (albums still settling)
    // finish, so no acknowledged update is dropped.
    let shutdown = dispatcher.shutdown_token();
    let restart_state = state.clone();
    let restart_watch = tokio::spawn(async move {
        restart_state.restart.notified().await;
        info!("Restart requested, waiting for in-flight updates to finish");
        loop {
            match shutdown.shutdown() {
                Ok(done) => {
                    done.await;
                    break;
                }
                // The dispatcher has not started polling yet.
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    });

    dispatcher.dispatch().await;
    restart_watch.abort();

    if state.restart_requested.load(Ordering::SeqCst) {
        Ok(RunOutcome::RestartRequested)
    } else {
        Ok(RunOutcome::Stopped)
    }
}

fn is_from_source(msg: Message, state: Arc<AppState>) -> bool {
    state.relay.accepts(msg.chat.id.0)
}

async fn handle_source_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let inbound = inbound_from(&msg);
    state.gateway.observe(&inbound);

    match state.relay.handle(inbound).await {
        Ok(Handled::Forwarded(kind)) => {
            info!("Relayed {} message {} from chat {}", kind, msg.id.0, msg.chat.id.0);
        }
        Ok(Handled::Duplicate) | Ok(Handled::Ignored) => {}
        Err(e) => {
            error!(
                "Failed to relay message {} from chat {}: {:#}",
                msg.id.0, msg.chat.id.0, e
            );
        }
    }

    Ok(())
}

async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let issuer = match msg.from.as_ref() {
        Some(user) => user.id.0,
        None => return Ok(()),
    };
    let command = match msg.text().and_then(OperatorCommand::parse) {
        Some(command) => command,
        None => return Ok(()),
    };

    info!("Command from user {}: {:?}", issuer, command);

    if let Some(response) = state.controller.execute(issuer, command) {
        respond(&bot, msg.chat.id, response, &state).await?;
    }

    Ok(())
}

async fn handle_callback(bot: Bot, query: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let issuer = query.from.id.0;
    if !state.controller.is_operator(issuer) {
        warn!("Ignoring callback from non-operator user {}", issuer);
        return Ok(());
    }

    // Dismiss the button's loading spinner
    bot.answer_callback_query(query.id.clone()).await.ok();

    let command = query.data.as_deref().and_then(OperatorCommand::from_callback);
    let Some(command) = command else {
        warn!("Unknown callback data: {:?}", query.data);
        return Ok(());
    };

    if let Some(response) = state.controller.execute(issuer, command) {
        respond(&bot, ChatId(issuer as i64), response, &state).await?;
    }

    Ok(())
}

async fn respond(
    bot: &Bot,
    chat_id: ChatId,
    response: ControlResponse,
    state: &AppState,
) -> ResponseResult<()> {
    match response {
        ControlResponse::Reply(text) => {
            bot.send_message(chat_id, text).await?;
        }
        ControlResponse::Menu(text) => {
            bot.send_message(chat_id, text)
                .reply_markup(menu_keyboard())
                .await?;
        }
        ControlResponse::Restart(text) => {
            bot.send_message(chat_id, text).await.ok();
            state.request_restart();
        }
    }
    Ok(())
}

fn menu_keyboard() -> InlineKeyboardMarkup {
    let buttons: Vec<Vec<InlineKeyboardButton>> = MENU_ACTIONS
        .iter()
        .map(|(label, data)| vec![InlineKeyboardButton::callback(*label, *data)])
        .collect();
    InlineKeyboardMarkup::new(buttons)
}
