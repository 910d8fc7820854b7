//! Display text in the supported languages.
//!
//! Locale only ever selects response messages. Prompts and every other value
//! forwarded to vendors pass through untouched.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ar,
}

impl Locale {
    /// Pick the first supported language from an `Accept-Language` value.
    pub fn from_accept_language(header: &str) -> Option<Locale> {
        header
            .split(',')
            .filter_map(|part| part.split(';').next())
            .filter_map(|tag| tag.trim().parse::<Locale>().ok())
            .next()
    }

    pub fn is_rtl(&self) -> bool {
        matches!(self, Locale::Ar)
    }
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let primary = s.split(['-', '_']).next().unwrap_or_default();
        match primary.to_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "ar" => Ok(Locale::Ar),
            _ => Err(anyhow::anyhow!("Unsupported locale: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    GenerationQueued,
    GenerationCancelled,
    PaymentSubmitted,
    PaymentApproved,
    PaymentRejected,
    PaymentUnchanged,
    VendorKeySaved,
    VendorKeyDeleted,
    SignedOut,
}

impl Message {
    pub fn text(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Message::GenerationQueued, Locale::En) => "Your request is queued",
            (Message::GenerationQueued, Locale::Ar) => "تمت إضافة طلبك إلى قائمة الانتظار",
            (Message::GenerationCancelled, Locale::En) => "Generation cancelled",
            (Message::GenerationCancelled, Locale::Ar) => "تم إلغاء عملية التوليد",
            (Message::PaymentSubmitted, Locale::En) => {
                "Payment submitted. An admin will review it shortly"
            }
            (Message::PaymentSubmitted, Locale::Ar) => "تم إرسال الدفع وسيراجعه المسؤول قريبًا",
            (Message::PaymentApproved, Locale::En) => "Payment approved and credits added",
            (Message::PaymentApproved, Locale::Ar) => "تمت الموافقة على الدفع وإضافة الرصيد",
            (Message::PaymentRejected, Locale::En) => "Payment rejected",
            (Message::PaymentRejected, Locale::Ar) => "تم رفض الدفع",
            (Message::PaymentUnchanged, Locale::En) => "Payment was already reviewed",
            (Message::PaymentUnchanged, Locale::Ar) => "تمت مراجعة هذا الدفع مسبقًا",
            (Message::VendorKeySaved, Locale::En) => "API key saved",
            (Message::VendorKeySaved, Locale::Ar) => "تم حفظ مفتاح الواجهة البرمجية",
            (Message::VendorKeyDeleted, Locale::En) => "API key removed",
            (Message::VendorKeyDeleted, Locale::Ar) => "تم حذف مفتاح الواجهة البرمجية",
            (Message::SignedOut, Locale::En) => "Signed out",
            (Message::SignedOut, Locale::Ar) => "تم تسجيل الخروج",
        }
    }
}
