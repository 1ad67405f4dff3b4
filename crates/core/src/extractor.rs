use crate::text::{normalize_paragraphs, normalize_whitespace};
use crate::traits::{ContentExtractor, ExtractedArticle};
use scraper::{ElementRef, Html};

const SKIPPED_TAGS: [&str; 11] = [
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form",
    "svg", "iframe",
];

const BLOCK_TAGS: [&str; 14] = [
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "pre", "blockquote", "figcaption", "td",
    "dd", "dt",
];

/// Content roots tried in order; the first with readable text wins.
const ROOT_TAGS: [&str; 3] = ["article", "main", "body"];

/// Readability-style extraction: boilerplate containers are skipped and the
/// text of block elements under the most specific content root is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadableExtractor;

impl ContentExtractor for ReadableExtractor {
    fn extract(&self, html: &str) -> ExtractedArticle {
        let document = Html::parse_document(html);
        let title = document_title(&document);

        let text = ROOT_TAGS
            .iter()
            .filter_map(|tag| first_element(&document, tag))
            .map(root_text)
            .find(|text| !text.is_empty())
            .unwrap_or_default();

        ExtractedArticle { title, text }
    }
}

fn root_text(root: ElementRef<'_>) -> String {
    if is_skipped(root) {
        return String::new();
    }

    let blocks = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| BLOCK_TAGS.contains(&element.value().name()))
        .filter(|element| !has_block_ancestor(*element))
        .filter(|element| !is_skipped(*element))
        .map(visible_text)
        .collect::<Vec<_>>();

    let text = normalize_paragraphs(blocks.iter().map(String::as_str));
    if !text.is_empty() {
        return text;
    }

    let loose = root
        .descendants()
        .filter(|node| node.value().is_text())
        .filter(|node| {
            !node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|element| SKIPPED_TAGS.contains(&element.value().name()))
        })
        .filter_map(|node| node.value().as_text().map(|text| String::from(&**text)))
        .collect::<Vec<_>>()
        .join(" ");
    normalize_whitespace(&loose)
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| SKIPPED_TAGS.contains(&ancestor.value().name()));
        if !hidden {
            text.push_str(fragment);
        }
    }
    text
}

fn is_skipped(element: ElementRef<'_>) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|element| SKIPPED_TAGS.contains(&element.value().name()))
}

fn has_block_ancestor(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| BLOCK_TAGS.contains(&ancestor.value().name()))
}

fn first_element<'a>(document: &'a Html, tag: &str) -> Option<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == tag)
}

fn document_title(document: &Html) -> Option<String> {
    let og_title = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "meta")
        .find(|element| element.value().attr("property") == Some("og:title"))
        .and_then(|element| element.value().attr("content"))
        .map(normalize_whitespace);

    og_title
        .into_iter()
        .chain(
            ["title", "h1"]
                .iter()
                .filter_map(|tag| first_element(document, tag))
                .map(|element| normalize_whitespace(&element.text().collect::<String>())),
        )
        .find(|title| !title.is_empty())
}
