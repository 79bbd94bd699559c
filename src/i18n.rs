//! Localized user-facing messages
//!
//! Every error that can reach an end user implements [`Localized`]. The
//! message catalogue ships English and French; callers pick a [`Locale`] at the
//! presentation edge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Fr => "fr",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    /// Accepts bare tags and region-qualified ones (`fr-SN`, `en_US`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = s
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "en" => Ok(Locale::En),
            "fr" => Ok(Locale::Fr),
            _ => Err(format!("Unsupported locale: {}", s)),
        }
    }
}

/// An English/French message pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub en: &'static str,
    pub fr: &'static str,
}

impl Message {
    pub const fn new(en: &'static str, fr: &'static str) -> Self {
        Self { en, fr }
    }

    pub fn get(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => self.en,
            Locale::Fr => self.fr,
        }
    }
}

/// Implemented by errors that may be shown to an end user
pub trait Localized {
    fn message(&self) -> Message;

    fn localized(&self, locale: Locale) -> &'static str {
        self.message().get(locale)
    }
}

pub mod catalog {
    use super::Message;

    pub const INSUFFICIENT_BALANCE: Message =
        Message::new("Insufficient balance", "Solde insuffisant");
    pub const COUNTRY_NOT_SUPPORTED: Message = Message::new(
        "This country is not supported yet",
        "Ce pays n'est pas encore pris en charge",
    );
    pub const CURRENCY_NOT_SUPPORTED: Message = Message::new(
        "This currency is not supported",
        "Cette devise n'est pas prise en charge",
    );
    pub const INVALID_RECIPIENT: Message = Message::new(
        "Recipient details are invalid",
        "Les informations du bénéficiaire sont invalides",
    );
    pub const PROVIDER_REJECTED: Message = Message::new(
        "The payment was declined by the provider",
        "Le paiement a été refusé par le prestataire",
    );
    pub const PROVIDER_UNAVAILABLE: Message = Message::new(
        "Payment service temporarily unavailable, please retry",
        "Service de paiement temporairement indisponible, veuillez réessayer",
    );
    pub const ALL_PROVIDERS_FAILED: Message = Message::new(
        "No payment provider could process this transfer",
        "Aucun prestataire n'a pu traiter ce transfert",
    );
    pub const RATE_UNAVAILABLE: Message = Message::new(
        "Exchange rate unavailable for this currency pair",
        "Taux de change indisponible pour cette paire de devises",
    );
    pub const INVALID_AMOUNT: Message =
        Message::new("Invalid amount", "Montant invalide");
    pub const TRANSFER_NOT_FOUND: Message =
        Message::new("Transfer not found", "Transfert introuvable");
    pub const TRANSFER_FAILED: Message = Message::new(
        "The transfer failed and your funds were returned",
        "Le transfert a échoué et vos fonds ont été restitués",
    );
    pub const SAME_WALLET: Message = Message::new(
        "Sender and recipient wallets must differ",
        "Les portefeuilles émetteur et bénéficiaire doivent être différents",
    );
    pub const DUPLICATE_REFERENCE: Message = Message::new(
        "A transfer with this reference is already in progress",
        "Un transfert avec cette référence est déjà en cours",
    );
    pub const INTERNAL: Message = Message::new(
        "An internal error occurred, please retry later",
        "Une erreur interne est survenue, veuillez réessayer plus tard",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_parse() {
        assert_eq!("fr-SN".parse::<Locale>(), Ok(Locale::Fr));
        assert_eq!("en_US".parse::<Locale>(), Ok(Locale::En));
        assert!("wo".parse::<Locale>().is_err());
    }

    #[test]
    fn test_message_pairs() {
        assert_eq!(
            catalog::INSUFFICIENT_BALANCE.get(Locale::Fr),
            "Solde insuffisant"
        );
        assert_eq!(
            catalog::INSUFFICIENT_BALANCE.get(Locale::En),
            "Insufficient balance"
        );
    }
}
