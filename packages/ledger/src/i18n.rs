//! Staff-facing messages for the POS terminal

use serde::{Deserialize, Serialize};

use crate::error::FailureReason;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    De,
    En,
}

impl Locale {
    /// Picks the first supported language of an `Accept-Language` header,
    /// ignoring quality weights.
    pub fn from_accept_language(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Self::default();
        };
        header
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(|tag| tag.trim().to_ascii_lowercase())
            .find_map(|tag| match tag.split('-').next() {
                Some("de") => Some(Self::De),
                Some("en") => Some(Self::En),
                _ => None,
            })
            .unwrap_or_default()
    }
}

pub fn staff_message(reason: FailureReason, locale: Locale) -> &'static str {
    use FailureReason::*;
    match locale {
        Locale::De => match reason {
            InvalidFormat => "Ungültiger Code. Bitte 6 Ziffern eingeben.",
            InvalidInput => "Ungültige Eingabe.",
            NotFound => "Code nicht gefunden.",
            InsufficientPoints => "Nicht genügend Punkte.",
            CouponUnavailable => "Gutschein ist nicht verfügbar.",
            AlreadyUsed => "Code wurde bereits eingelöst.",
            ShopMismatch => "Code gehört zu einem anderen Geschäft.",
            Expired => "Code ist abgelaufen. Kunde muss den Gutschein neu aktivieren.",
            CouponExpired => "Gutschein ist abgelaufen.",
            AlreadyReversed => "Einlösung wurde bereits storniert.",
            StillActive => "Code ist noch aktiv.",
            AlreadyClaimed => "Beleg wurde bereits eingelöst.",
            TransactionCancelled => "Beleg wurde storniert.",
            ServerError => "Technischer Fehler. Bitte erneut versuchen.",
        },
        Locale::En => match reason {
            InvalidFormat => "Invalid code. Please enter 6 digits.",
            InvalidInput => "Invalid input.",
            NotFound => "Code not found.",
            InsufficientPoints => "Not enough points.",
            CouponUnavailable => "Coupon is not available.",
            AlreadyUsed => "Code has already been used.",
            ShopMismatch => "Code belongs to a different shop.",
            Expired => "Code has expired. The customer has to activate the coupon again.",
            CouponExpired => "Coupon has expired.",
            AlreadyReversed => "Redemption was already reversed.",
            StillActive => "Code is still active.",
            AlreadyClaimed => "Receipt has already been claimed.",
            TransactionCancelled => "Receipt was cancelled.",
            ServerError => "Technical error. Please try again.",
        },
    }
}
