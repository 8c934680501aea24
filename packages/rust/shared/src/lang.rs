//! Supported languages: display names, flag glyphs, writing systems, and the
//! localized labels used inside rendered components.

/// Writing system a language is normally written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
    Greek,
}

impl Script {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latin => "Latin",
            Self::Cyrillic => "Cyrillic",
            Self::Greek => "Greek",
        }
    }
}

/// Component labels rendered in the reader's language.
#[derive(Debug, Clone, Copy)]
pub struct Labels {
    pub pronunciation: &'static str,
    pub phrase_to_learn: &'static str,
    pub cultural_tip: &'static str,
}

/// Static metadata for one supported language.
#[derive(Debug, Clone, Copy)]
pub struct Language {
    pub code: &'static str,
    /// English display name, used in prompts.
    pub name: &'static str,
    pub flag: &'static str,
    pub script: Script,
    pub labels: Labels,
}

const fn lang(
    code: &'static str,
    name: &'static str,
    flag: &'static str,
    script: Script,
    labels: [&'static str; 3],
) -> Language {
    Language {
        code,
        name,
        flag,
        script,
        labels: Labels {
            pronunciation: labels[0],
            phrase_to_learn: labels[1],
            cultural_tip: labels[2],
        },
    }
}

static LANGUAGES: [Language; 18] = [
    lang("en", "English", "🇬🇧", Script::Latin, ["Pronunciation", "Phrase to Learn", "Cultural Tip"]),
    lang("es", "Spanish", "🇪🇸", Script::Latin, ["Pronunciación", "Frase para aprender", "Consejo cultural"]),
    lang("fr", "French", "🇫🇷", Script::Latin, ["Prononciation", "Phrase à apprendre", "Conseil culturel"]),
    lang("de", "German", "🇩🇪", Script::Latin, ["Aussprache", "Redewendung zum Lernen", "Kultureller Tipp"]),
    lang("it", "Italian", "🇮🇹", Script::Latin, ["Pronuncia", "Frase da imparare", "Consiglio culturale"]),
    lang("pt", "Portuguese", "🇵🇹", Script::Latin, ["Pronúncia", "Frase para aprender", "Dica cultural"]),
    lang("pl", "Polish", "🇵🇱", Script::Latin, ["Wymowa", "Zwrot do nauki", "Wskazówka kulturowa"]),
    lang("nl", "Dutch", "🇳🇱", Script::Latin, ["Uitspraak", "Zin om te leren", "Culturele tip"]),
    lang("ro", "Romanian", "🇷🇴", Script::Latin, ["Pronunție", "Expresie de învățat", "Sfat cultural"]),
    lang("ru", "Russian", "🇷🇺", Script::Cyrillic, ["Произношение", "Фраза для изучения", "Культурный совет"]),
    lang("uk", "Ukrainian", "🇺🇦", Script::Cyrillic, ["Вимова", "Фраза для вивчення", "Культурна порада"]),
    lang("tr", "Turkish", "🇹🇷", Script::Latin, ["Telaffuz", "Öğrenilecek ifade", "Kültürel ipucu"]),
    lang("sv", "Swedish", "🇸🇪", Script::Latin, ["Uttal", "Fras att lära sig", "Kulturtips"]),
    lang("no", "Norwegian", "🇳🇴", Script::Latin, ["Uttale", "Frase å lære", "Kulturtips"]),
    lang("da", "Danish", "🇩🇰", Script::Latin, ["Udtale", "Sætning at lære", "Kulturtip"]),
    lang("cs", "Czech", "🇨🇿", Script::Latin, ["Výslovnost", "Fráze k naučení", "Kulturní tip"]),
    lang("el", "Greek", "🇬🇷", Script::Greek, ["Προφορά", "Φράση για εκμάθηση", "Πολιτιστική συμβουλή"]),
    lang("hu", "Hungarian", "🇭🇺", Script::Latin, ["Kiejtés", "Megtanulandó kifejezés", "Kulturális tipp"]),
];

/// Look up a supported language by its two-letter code.
pub fn language(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.code.eq_ignore_ascii_case(code))
}

/// English display name for a code, falling back to the code itself.
pub fn display_name(code: &str) -> String {
    language(code).map_or_else(|| code.to_string(), |l| l.name.to_string())
}

/// Expected writing system for a code. Unknown codes are assumed Latin.
pub fn script_of(code: &str) -> Script {
    language(code).map_or(Script::Latin, |l| l.script)
}

/// Component labels in the given language, falling back to English.
pub fn labels(code: &str) -> Labels {
    language(code).unwrap_or(&LANGUAGES[0]).labels
}

/// Flag glyph for a language, if known.
pub fn flag(code: &str) -> Option<&'static str> {
    language(code).map(|l| l.flag)
}

/// All supported language codes.
pub fn codes() -> impl Iterator<Item = &'static str> {
    LANGUAGES.iter().map(|l| l.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(language("RU").map(|l| l.name), Some("Russian"));
        assert_eq!(display_name("xx"), "xx");
    }

    #[test]
    fn scripts() {
        assert_eq!(script_of("uk"), Script::Cyrillic);
        assert_eq!(script_of("el"), Script::Greek);
        assert_eq!(script_of("pl"), Script::Latin);
        assert_eq!(script_of("zz"), Script::Latin);
    }

    #[test]
    fn labels_fall_back_to_english() {
        assert_eq!(labels("de").pronunciation, "Aussprache");
        assert_eq!(labels("xx").cultural_tip, "Cultural Tip");
    }

    #[test]
    fn codes_are_unique() {
        let mut all: Vec<_> = codes().collect();
        let n = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), n);
    }
}
