pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapses runs of whitespace inside each paragraph and drops empty ones,
/// keeping paragraphs separated by a blank line.
pub fn normalize_paragraphs<'a>(paragraphs: impl IntoIterator<Item = &'a str>) -> String {
    paragraphs
        .into_iter()
        .map(normalize_whitespace)
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cuts `text` to at most `max_chars` characters.
///
/// The cut lands on the last paragraph or sentence boundary inside the limit,
/// falling back to the last word boundary. A single word longer than the limit
/// yields an empty string rather than a split word.
pub fn truncate_at_boundary(text: &str, max_chars: usize) -> &str {
    let text = text.trim();
    let Some((limit, next)) = text.char_indices().nth(max_chars) else {
        return text;
    };

    let window = &text[..limit];
    let paragraph_end = window.rfind("\n\n");
    let sentence_end = last_sentence_end(window, next);

    let cut = match (paragraph_end, sentence_end) {
        (Some(paragraph), Some(sentence)) => Some(paragraph.max(sentence)),
        (paragraph, sentence) => paragraph.or(sentence),
    };

    let cut = cut.or_else(|| {
        if next.is_whitespace() {
            Some(limit)
        } else {
            window.rfind(char::is_whitespace)
        }
    });

    match cut {
        Some(end) => text[..end].trim_end(),
        None => "",
    }
}

fn last_sentence_end(window: &str, next: char) -> Option<usize> {
    let mut following = next;
    for (index, character) in window.char_indices().rev() {
        if matches!(character, '.' | '!' | '?') && following.is_whitespace() {
            return Some(index + character.len_utf8());
        }
        following = character;
    }
    None
}
