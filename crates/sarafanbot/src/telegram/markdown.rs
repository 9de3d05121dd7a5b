use sarafancore::notify::{InlineAction, Keyboard, Outgoing, TextFormat};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, MessageId, ParseMode, ReplyMarkup,
};
use teloxide::RequestError;

pub(crate) fn is_markdown_parse_error(err: &RequestError) -> bool {
    err.to_string().to_lowercase().contains("can't parse entities")
}

pub(crate) fn is_not_modified_error(err: &RequestError) -> bool {
    err.to_string().contains("message is not modified")
}

/// Inline rows as teloxide markup. Url buttons with unparsable urls are dropped.
pub(crate) fn inline_markup(rows: &[Vec<sarafancore::notify::InlineButton>]) -> InlineKeyboardMarkup {
    let rows = rows.iter().map(|row| {
        row.iter()
            .filter_map(|button| match &button.action {
                InlineAction::Callback(data) => Some(InlineKeyboardButton::callback(button.label.clone(), data.clone())),
                InlineAction::Url(raw) => match url::Url::parse(raw) {
                    Ok(url) => Some(InlineKeyboardButton::url(button.label.clone(), url)),
                    Err(e) => {
                        tracing::warn!(url = %raw, error = %e, "Dropping button with invalid url");
                        None
                    }
                },
            })
            .collect::<Vec<_>>()
    });
    InlineKeyboardMarkup::new(rows)
}

pub(crate) fn reply_markup(keyboard: &Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Inline(rows) => inline_markup(rows).into(),
        Keyboard::Reply(rows) => {
            let mut markup = KeyboardMarkup::new(
                rows.iter()
                    .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>()),
            );
            markup.resize_keyboard = true;
            markup.into()
        }
    }
}

/// Send a message; MarkdownV2 texts that Telegram rejects are re-sent as plain text.
pub async fn send_with_fallback(bot: &Bot, chat_id: ChatId, message: &Outgoing) -> ResponseResult<Message> {
    let markup = message.keyboard.as_ref().map(reply_markup);

    let mut req = bot.send_message(chat_id, message.text.clone());
    if message.format == TextFormat::Markdown {
        req = req.parse_mode(ParseMode::MarkdownV2);
    }
    if let Some(kb) = markup.clone() {
        req = req.reply_markup(kb);
    }

    match req.await {
        Ok(msg) => Ok(msg),
        Err(e) if message.format == TextFormat::Markdown && is_markdown_parse_error(&e) => {
            tracing::warn!(chat_id = chat_id.0, error = %e, "MarkdownV2 rejected, resending as plain text");
            let mut retry = bot.send_message(chat_id, message.text.clone());
            if let Some(kb) = markup {
                retry = retry.reply_markup(kb);
            }
            retry.await
        }
        Err(e) => Err(e),
    }
}

/// Edit a message text with the same fallback as [`send_with_fallback`].
///
/// Only inline keyboards can be attached to an edited message; an empty one
/// removes the buttons.
pub async fn edit_with_fallback(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    message: &Outgoing,
) -> ResponseResult<()> {
    let markup = match &message.keyboard {
        Some(Keyboard::Inline(rows)) => Some(inline_markup(rows)),
        Some(Keyboard::Reply(_)) => {
            tracing::warn!(chat_id = chat_id.0, "Reply keyboard ignored on edit");
            None
        }
        None => None,
    };

    let mut req = bot.edit_message_text(chat_id, message_id, message.text.clone());
    if message.format == TextFormat::Markdown {
        req = req.parse_mode(ParseMode::MarkdownV2);
    }
    if let Some(kb) = markup.clone() {
        req = req.reply_markup(kb);
    }

    let result = match req.await {
        Err(e) if message.format == TextFormat::Markdown && is_markdown_parse_error(&e) => {
            tracing::warn!(chat_id = chat_id.0, error = %e, "MarkdownV2 rejected, editing as plain text");
            let mut retry = bot.edit_message_text(chat_id, message_id, message.text.clone());
            if let Some(kb) = markup {
                retry = retry.reply_markup(kb);
            }
            retry.await
        }
        other => other,
    };

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_not_modified_error(&e) => Ok(()),
        Err(e) => Err(e),
    }
}
