//! Message templates.
//!
//! Markdown templates escape every interpolated value with
//! [`escape_markdown`]; the fixed parts are written pre-escaped.

use chrono::{DateTime, Utc};
use indoc::{formatdoc, indoc};

use super::{InlineButton, Keyboard, Outgoing};
use crate::core::utils::escape_markdown;
use crate::orders::Order;

/// Label of the reply-keyboard button that asks for a referral link.
pub const SHARE_BUTTON_TEXT: &str = "Отправить другу";

/// Caption of the link inside the share message.
pub const SHARE_LINK_CAPTION: &str = "Написать консультанту";

/// Callback data prefix of the staff "claim" button.
pub const TAKE_ORDER_PREFIX: &str = "take_order:";

/// Callback data of the reminder's upgrade button.
pub const CONSULTATION_CONTINUE: &str = "consultation_continue";

const DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

fn format_date(at: DateTime<Utc>) -> String {
    escape_markdown(&at.format(DATE_FORMAT).to_string())
}

pub fn take_order_data(order_id: &str) -> String {
    format!("{TAKE_ORDER_PREFIX}{order_id}")
}

/// Staff-channel announcement of a fresh order, with the claim button.
pub fn staff_new_order(order: &Order) -> Outgoing {
    let mut text = formatdoc! {"
        🌟 *НОВАЯ ЗАЯВКА НА КОНСУЛЬТАЦИЮ* 🌟

        *ID заявки:* `{id}`
        *Клиент:* {name}
        *Username:* @{handle}
        *Дата заявки:* {created}
        ",
        id = order.id,
        name = escape_markdown(&order.client_name),
        handle = escape_markdown(&order.client_handle),
        created = format_date(order.created_at),
    };

    if let Some(referrer) = &order.referrer_name {
        text.push_str(&format!("\n*Приглашен пользователем:* {}\n", escape_markdown(referrer)));
    }
    text.push_str("\n*Нажмите кнопку ниже, чтобы взять заявку в работу\\.*");

    Outgoing::markdown(text).with_keyboard(Keyboard::Inline(vec![vec![InlineButton::callback(
        "🔮 Взять в работу",
        take_order_data(&order.id),
    )]]))
}

/// Replacement for the announcement once a staff member has claimed the order.
pub fn staff_claimed(order: &Order) -> Outgoing {
    let taken = order.taken_at.map(format_date).unwrap_or_default();
    let staff = escape_markdown(order.staff_name.as_deref().unwrap_or_default());

    let text = formatdoc! {"
        🌟 *ЗАЯВКА В РАБОТЕ* 🌟

        *ID заявки:* `{id}`
        *Клиент:* {name}
        *Username:* @{handle}
        *Дата заявки:* {created}

        *Взята в работу:* {taken}
        *Консультант:* {staff}",
        id = order.id,
        name = escape_markdown(&order.client_name),
        handle = escape_markdown(&order.client_handle),
        created = format_date(order.created_at),
    };

    Outgoing::markdown(text).with_keyboard(Keyboard::empty_inline())
}

/// Staff-channel notice that a client asked for the full consultation.
pub fn staff_full_request(order: &Order) -> Outgoing {
    let staff = order
        .staff_name
        .as_deref()
        .map(escape_markdown)
        .unwrap_or_else(|| "не назначен".to_string());

    Outgoing::markdown(formatdoc! {"
        💎 *ЗАПРОС ПОЛНОЙ КОНСУЛЬТАЦИИ* 💎

        *ID заявки:* `{id}`
        *Клиент:* {name}
        *Username:* @{handle}
        *Консультант:* {staff}",
        id = order.id,
        name = escape_markdown(&order.client_name),
        handle = escape_markdown(&order.client_handle),
    })
}

pub fn client_request_received() -> Outgoing {
    Outgoing::plain(
        "✨ Спасибо за ваш запрос на консультацию! Консультант скоро получит уведомление и свяжется с вами.",
    )
}

pub fn client_claimed() -> Outgoing {
    Outgoing::plain("✨ Ваш запрос на консультацию принят в работу! Консультант скоро свяжется с вами.")
}

pub fn referrer_friend_used(friend_name: &str) -> Outgoing {
    Outgoing::plain(format!(
        "🎉 Отличные новости! Ваш друг {friend_name} воспользовался вашей рекомендацией и запросил консультацию."
    ))
}

pub fn consultation_exists() -> Outgoing {
    Outgoing::plain(
        "⚠️ Вы уже оставили заявку на консультацию. Каждый пользователь может получить только одну бесплатную консультацию.",
    )
}

pub fn order_already_claimed(order_id: &str) -> Outgoing {
    Outgoing::plain(format!("Заявка {order_id} уже взята в работу другим консультантом."))
}

pub fn no_active_order() -> Outgoing {
    Outgoing::plain("У вас нет активной заявки. Отправьте /consultation, чтобы оставить новую.")
}

pub fn full_request_accepted() -> Outgoing {
    Outgoing::plain("💎 Спасибо! Мы передали ваш запрос на полную консультацию, консультант свяжется с вами.")
}

/// Follow-up sent to a client some time after the claim.
pub fn reminder() -> Outgoing {
    Outgoing::plain(indoc! {"
        ⭐ Хотите узнать больше? ⭐

        Только сегодня скидка на полную консультацию. Нажмите кнопку ниже, чтобы записаться."})
    .with_keyboard(Keyboard::Inline(vec![vec![InlineButton::callback(
        "Записаться на консультацию",
        CONSULTATION_CONTINUE,
    )]]))
}

pub fn document_ready(url: &str) -> Outgoing {
    Outgoing::plain("📄 Ваш разбор готов! Откройте документ по кнопке ниже.")
        .with_keyboard(Keyboard::Inline(vec![vec![InlineButton::url("Открыть документ", url)]]))
}

pub fn welcome() -> Outgoing {
    Outgoing::plain("Нажмите кнопку ниже, чтобы подготовить приглашение для друга 👇")
        .with_keyboard(Keyboard::Reply(vec![vec![SHARE_BUTTON_TEXT.to_string()]]))
}

pub fn referral_link(bot_username: &str, code: &str) -> String {
    format!("https://t.me/{bot_username}?start=ref_{code}")
}

/// Text the user forwards to a friend.
pub fn share_message(bot_username: &str, code: &str) -> Outgoing {
    Outgoing::markdown(formatdoc! {"
        Привет\\! Я только что получила консультацию, и она реально классная\\! 🙌

        У меня есть для тебя уникальный подарок – мини\\-консультация\\!

        🚀 Нажми сюда: [💌 {caption}]({link})",
        caption = SHARE_LINK_CAPTION,
        link = referral_link(bot_username, code),
    })
}

pub fn share_instruction() -> Outgoing {
    Outgoing::plain("👆 Перешлите это сообщение другу, чтобы он получил подарок!")
}

pub fn start_hint() -> Outgoing {
    Outgoing::plain("Здравствуйте! Отправьте /start для начала работы с ботом.")
}

pub fn generic_error() -> Outgoing {
    Outgoing::plain("Произошла ошибка при обработке запроса. Пожалуйста, попробуйте позже.")
}
