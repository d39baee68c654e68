//! Language detection (C8): maps free text to one of the 24 official EU
//! languages (ISO 639-1), falling back to English when detection is
//! inconclusive or lands outside that set.

use whatlang::{detect, Lang};

/// ISO 639-1 codes for the 24 official EU languages, in `whatlang::Lang` order.
fn to_eu_code(lang: Lang) -> Option<&'static str> {
    match lang {
        Lang::Bul => Some("bg"),
        Lang::Ces => Some("cs"),
        Lang::Dan => Some("da"),
        Lang::Deu => Some("de"),
        Lang::Ell => Some("el"),
        Lang::Eng => Some("en"),
        Lang::Spa => Some("es"),
        Lang::Est => Some("et"),
        Lang::Fin => Some("fi"),
        Lang::Fra => Some("fr"),
        Lang::Hrv => Some("hr"),
        Lang::Hun => Some("hu"),
        Lang::Ita => Some("it"),
        Lang::Lit => Some("lt"),
        Lang::Lav => Some("lv"),
        Lang::Nld => Some("nl"),
        Lang::Pol => Some("pl"),
        Lang::Por => Some("pt"),
        Lang::Ron => Some("ro"),
        Lang::Slk => Some("sk"),
        Lang::Slv => Some("sl"),
        Lang::Swe => Some("sv"),
        _ => None,
    }
}

/// Detects the ISO 639-1 code of `text`, falling back to `"en"` when
/// `whatlang` can't decide or lands on a non-EU language. Irish (`ga`) and
/// Maltese (`mt`) have no `whatlang` model and always fall back to English.
pub fn detect_language(text: &str) -> String {
    detect(text)
        .and_then(|info| to_eu_code(info.lang()))
        .unwrap_or("en")
        .to_string()
}
