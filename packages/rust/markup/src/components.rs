//! Canonical HTML for each logical component.
//!
//! Templates carry no indentation and no blank lines, so rendered components
//! survive a second pass through the Markdown renderer as raw HTML blocks.

use articlefix_shared::lang;

use crate::attrs::{escape_html, parse_conjugations};
use crate::cleanup;
use crate::NormalizeStats;
use crate::tags::{Component, Field, Tag};

/// Language context for labels and flag glyphs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderContext<'a> {
    pub native: &'a str,
    pub target: Option<&'a str>,
}

/// Render one tag to canonical HTML. CTAs render to nothing.
pub(crate) fn render(
    tag: &Tag,
    src: &str,
    ctx: RenderContext<'_>,
    stats: &mut NormalizeStats,
) -> String {
    match tag.component {
        Component::Vocab => render_vocab(tag, ctx),
        Component::PhraseOfDay => render_phrase_of_day(tag, ctx),
        Component::CultureTip => render_culture_tip(tag, src, ctx, stats),
        Component::ConjugationTable => render_conjugation_table(tag),
        Component::Cta => String::new(),
    }
}

fn render_vocab(tag: &Tag, ctx: RenderContext<'_>) -> String {
    let labels = lang::labels(ctx.native);
    let word = tag.field_text(Field::Word);
    let translation = tag.field_text(Field::Translation);
    let pronunciation = tag.field_text(Field::Pronunciation);
    let example = tag.field_text(Field::Example);

    let mut html = format!(
        "<div class=\"af-vocab\">\n<div class=\"af-vocab-head\"><span class=\"af-word\">{}</span><span class=\"af-translation\">{}</span></div>\n",
        escape_html(&word),
        escape_html(&translation),
    );
    if !pronunciation.is_empty() {
        html.push_str(&format!(
            "<p class=\"af-pronunciation\">{}: <code>{}</code></p>\n",
            escape_html(labels.pronunciation),
            escape_html(&pronunciation),
        ));
    }
    if !example.is_empty() {
        html.push_str(&format!(
            "<p class=\"af-example\">{}</p>\n",
            escape_html(&example)
        ));
    }
    html.push_str("</div>");
    html
}

fn render_phrase_of_day(tag: &Tag, ctx: RenderContext<'_>) -> String {
    let labels = lang::labels(ctx.native);
    let word = tag.field_text(Field::Word);
    let translation = tag.field_text(Field::Translation);
    let pronunciation = tag.field_text(Field::Pronunciation);
    let context = tag.field_text(Field::Context);

    let mut html = format!(
        "<div class=\"af-phrase\">\n<p class=\"af-phrase-label\">{}</p>\n<p class=\"af-phrase-text\">{}</p>\n<p class=\"af-phrase-translation\">{}</p>\n",
        escape_html(labels.phrase_to_learn),
        escape_html(&word),
        escape_html(&translation),
    );
    if !pronunciation.is_empty() {
        html.push_str(&format!(
            "<p class=\"af-phrase-pronunciation\">[ {} ]</p>\n",
            escape_html(&pronunciation)
        ));
    }
    if !context.is_empty() {
        html.push_str(&format!(
            "<p class=\"af-phrase-context\">{}</p>\n",
            escape_html(&context)
        ));
    }
    html.push_str("</div>");
    html
}

fn render_culture_tip(
    tag: &Tag,
    src: &str,
    ctx: RenderContext<'_>,
    stats: &mut NormalizeStats,
) -> String {
    let title = match tag.field_text(Field::Title) {
        t if t.is_empty() => lang::labels(ctx.native).cultural_tip.to_string(),
        t => t,
    };
    let flag = match tag.field_text(Field::Flag) {
        f if f.is_empty() => ctx.target.and_then(lang::flag).unwrap_or_default().to_string(),
        f => f,
    };

    let body = tag
        .body_text(src)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| tag.field_text(Field::Content));
    let inner = cleanup::drop_blank_lines(crate::render_fragment(&body, ctx, stats).trim());

    let mut html = String::from("<div class=\"af-culture-tip\">\n<div class=\"af-culture-tip-head\">");
    if !flag.is_empty() {
        html.push_str(&format!("<span class=\"af-flag\">{}</span>", escape_html(&flag)));
    }
    html.push_str(&format!(
        "<h4>{}</h4></div>\n<div class=\"af-culture-tip-body\">\n{inner}\n</div>\n</div>",
        escape_html(&title)
    ));
    html
}

fn render_conjugation_table(tag: &Tag) -> String {
    let verb = tag.field_text(Field::Verb);
    let meaning = tag.field_text(Field::Meaning);
    let rows = tag
        .attr("conjugations")
        .map(|a| parse_conjugations(&a.value))
        .unwrap_or_default();

    let mut html = format!(
        "<div class=\"af-conjugation\">\n<div class=\"af-conjugation-head\"><h4>{}</h4><p>{}</p></div>\n<table>\n<tbody>\n",
        escape_html(&verb),
        escape_html(&meaning),
    );
    for row in &rows {
        html.push_str(&format!(
            "<tr><td class=\"af-person\">{}</td><td class=\"af-form\">{}</td><td class=\"af-gloss\">{}</td></tr>\n",
            escape_html(&row.person),
            escape_html(&row.word),
            escape_html(&row.translation),
        ));
    }
    html.push_str("</tbody>\n</table>\n</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::scan;

    fn render_first(src: &str, native: &str, target: Option<&str>) -> String {
        let scan = scan(src);
        render(
            &scan.tags[0],
            src,
            RenderContext { native, target },
            &mut NormalizeStats::default(),
        )
    }

    #[test]
    fn vocab_card_renders_fields_and_localized_label() {
        let html = render_first(
            r#"<VocabCard word="casa" translation="house" pronunciation="KAH-sah" example="Mi casa." />"#,
            "es",
            Some("en"),
        );
        assert!(html.contains("<span class=\"af-word\">casa</span>"));
        assert!(html.contains("house"));
        assert!(html.contains("Pronunciación: <code>KAH-sah</code>"));
        assert!(html.contains("Mi casa."));
        assert!(!html.contains("\n\n"));
    }

    #[test]
    fn empty_optional_fields_are_omitted() {
        let html = render_first(r#"<VocabCard word="kot" translation="cat" />"#, "en", None);
        assert!(!html.contains("af-pronunciation"));
        assert!(!html.contains("af-example"));
    }

    #[test]
    fn culture_tip_defaults_title_and_flag() {
        let html = render_first(
            "<CultureTip>\nAlways **bring flowers**.\n\nOdd numbers only.\n</CultureTip>",
            "de",
            Some("pl"),
        );
        assert!(html.contains("<h4>Kultureller Tipp</h4>"));
        assert!(html.contains("🇵🇱"));
        assert!(html.contains("<strong>bring flowers</strong>"));
        assert!(!html.contains("\n\n"));
    }

    #[test]
    fn culture_tip_content_attribute() {
        let html = render_first(
            r#"<CultureTip title="Tea" flag="🇬🇧" content="Milk first?" />"#,
            "en",
            Some("pl"),
        );
        assert!(html.contains("<h4>Tea</h4>"));
        assert!(html.contains("🇬🇧"));
        assert!(html.contains("Milk first?"));
    }

    #[test]
    fn conjugation_table_rows() {
        let html = render_first(
            r#"<ConjugationTable verb="być" meaning="to be" conjugations={[{person: "ja", word: "jestem", translation: "I am"}]} />"#,
            "en",
            Some("pl"),
        );
        assert!(html.contains("<h4>być</h4>"));
        assert!(html.contains("<td class=\"af-form\">jestem</td>"));
    }

    #[test]
    fn cta_renders_nothing() {
        assert_eq!(render_first(r#"<CTA href="/signup" />"#, "en", None), "");
    }
}
