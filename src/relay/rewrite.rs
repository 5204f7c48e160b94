use crate::relay::message::Entity;

const MENTION_SIGIL: char = '@';

/// Replacement values applied to every relayed message.
/// A `None` half leaves the matching part of the content untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementRule {
    pub url: Option<String>,
    pub username: Option<String>,
}

impl ReplacementRule {
    pub fn new(url: Option<String>, username: Option<String>) -> Self {
        Self { url, username }
    }
}

/// A replaced token, in UTF-16 units of the original text
#[derive(Debug, Clone, Copy)]
struct Replacement {
    start: usize,
    end: usize,
    new_len: usize,
}

/// Replace every whitespace-delimited token that starts with `@` by the
/// replacement username. Whitespace between tokens is kept verbatim.
pub fn rewrite_text(text: &str, rule: &ReplacementRule) -> String {
    let Some(username) = rule.username.as_deref() else {
        return text.to_string();
    };

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        let ws_end = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        out.push_str(&rest[..ws_end]);
        rest = &rest[ws_end..];

        let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..token_end];
        if token.starts_with(MENTION_SIGIL) {
            out.push(MENTION_SIGIL);
            out.push_str(username);
        } else {
            out.push_str(token);
        }
        rest = &rest[token_end..];
    }

    out
}

/// Rewrite text and entities together, moving entity spans to follow any
/// mention whose length changed.
pub fn rewrite_content(
    text: &str,
    entities: &[Entity],
    rule: &ReplacementRule,
) -> (String, Vec<Entity>) {
    let replacements = mention_replacements(text, rule);
    let entities = rewrite_entities(entities, rule)
        .into_iter()
        .map(|mut entity| {
            let start = remap(entity.offset, &replacements, Edge::Start);
            let end = remap(entity.offset + entity.length, &replacements, Edge::End);
            entity.offset = start;
            entity.length = end.saturating_sub(start);
            entity
        })
        .collect();
    (rewrite_text(text, rule), entities)
}

/// Spans of the mentions whose length `rewrite_text` changes, in text order
fn mention_replacements(text: &str, rule: &ReplacementRule) -> Vec<Replacement> {
    let Some(username) = rule.username.as_deref() else {
        return Vec::new();
    };
    let new_len = 1 + username.encode_utf16().count();

    let mut replacements = Vec::new();
    let mut position = 0;
    let mut rest = text;

    while !rest.is_empty() {
        let ws_end = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        position += rest[..ws_end].encode_utf16().count();
        rest = &rest[ws_end..];

        let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..token_end];
        let token_len = token.encode_utf16().count();
        if token.starts_with(MENTION_SIGIL) && token_len != new_len {
            replacements.push(Replacement {
                start: position,
                end: position + token_len,
                new_len,
            });
        }
        position += token_len;
        rest = &rest[token_end..];
    }

    replacements
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Start,
    End,
}

/// Map a position in the original text to the rewritten text.
/// A position inside a replaced token snaps to that token's start or end.
fn remap(position: usize, replacements: &[Replacement], edge: Edge) -> usize {
    let mut shift: isize = 0;
    for replacement in replacements {
        let new_start = (replacement.start as isize + shift) as usize;
        if replacement.end <= position {
            shift += replacement.new_len as isize - (replacement.end - replacement.start) as isize;
        } else if replacement.start < position {
            return match edge {
                Edge::Start => new_start,
                Edge::End => new_start + replacement.new_len,
            };
        } else {
            break;
        }
    }
    (position as isize + shift) as usize
}

/// Rewrite link targets and user references, one output entity per input entity.
pub fn rewrite_entities(entities: &[Entity], rule: &ReplacementRule) -> Vec<Entity> {
    entities
        .iter()
        .map(|entity| {
            let mut entity = entity.clone();
            if let (Some(url), Some(replacement)) = (entity.url.as_mut(), rule.url.as_ref()) {
                url.clone_from(replacement);
            }
            if let (Some(user), Some(replacement)) = (entity.user.as_mut(), rule.username.as_ref())
            {
                user.username = Some(replacement.clone());
            }
            entity
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::message::{EntityStyle, UserRef};

    fn rule() -> ReplacementRule {
        ReplacementRule::new(
            Some("https://example.com".to_string()),
            Some("relay".to_string()),
        )
    }

    #[test]
    fn test_text_without_mentions_is_unchanged() {
        for text in [
            "hello world",
            "  leading and   inner  runs ",
            "line one\nline two\n\n\tindented",
            "email me at a@b.c",
            "",
        ] {
            assert_eq!(rewrite_text(text, &rule()), text);
        }
    }

    #[test]
    fn test_mentions_are_replaced_wholesale() {
        assert_eq!(
            rewrite_text("join @someone, or @other!", &rule()),
            "join @relay or @relay"
        );
        assert_eq!(rewrite_text("@a\n@b", &rule()), "@relay\n@relay");
    }

    #[test]
    fn test_text_rewrite_is_idempotent() {
        let once = rewrite_text("hi @x there @y", &rule());
        assert_eq!(rewrite_text(&once, &rule()), once);
    }

    #[test]
    fn test_text_rewrite_without_username_passes_through() {
        let rule = ReplacementRule::default();
        assert_eq!(rewrite_text("hi @x", &rule), "hi @x");
    }

    #[test]
    fn test_entities_keep_count_and_order() {
        let input = vec![
            Entity::styled(EntityStyle::Bold, 0, 4),
            Entity::link("https://spam.example", 5, 3),
            Entity::mention(
                UserRef {
                    id: 42,
                    username: Some("original".to_string()),
                },
                9,
                6,
            ),
            Entity::styled(EntityStyle::Italic, 16, 2),
        ];

        let output = rewrite_entities(&input, &rule());

        assert_eq!(output.len(), input.len());
        assert_eq!(output[0], input[0]);
        assert_eq!(output[1].url.as_deref(), Some("https://example.com"));
        assert_eq!(output[1].offset, 5);
        let user = output[2].user.as_ref().unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.username.as_deref(), Some("relay"));
        assert_eq!(output[3], input[3]);
    }

    #[test]
    fn test_entity_with_url_and_user_rewrites_both() {
        let mut entity = Entity::link("https://spam.example", 0, 1);
        entity.user = Some(UserRef {
            id: 1,
            username: None,
        });

        let output = rewrite_entities(&[entity], &rule());

        assert_eq!(output[0].url.as_deref(), Some("https://example.com"));
        assert_eq!(
            output[0].user.as_ref().unwrap().username.as_deref(),
            Some("relay")
        );
    }

    #[test]
    fn test_entities_follow_shortened_mentions() {
        // "@someone_long look here" -> "@relay look here"
        let entities = vec![
            Entity::styled(EntityStyle::Mention, 0, 13),
            Entity::styled(EntityStyle::Bold, 14, 4),
            Entity::link("https://spam.example", 19, 4),
        ];

        let (text, output) = rewrite_content("@someone_long look here", &entities, &rule());

        assert_eq!(text, "@relay look here");
        assert_eq!((output[0].offset, output[0].length), (0, 6));
        assert_eq!((output[1].offset, output[1].length), (7, 4));
        assert_eq!((output[2].offset, output[2].length), (12, 4));
        assert_eq!(output[2].url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_entities_follow_lengthened_mentions() {
        // "@a and @b x" -> "@relay and @relay x", bold over "x"
        let entities = vec![
            Entity::styled(EntityStyle::Italic, 3, 3),
            Entity::styled(EntityStyle::Bold, 10, 1),
        ];

        let (text, output) = rewrite_content("@a and @b x", &entities, &rule());

        assert_eq!(text, "@relay and @relay x");
        assert_eq!(&text[7..10], "and");
        assert_eq!((output[0].offset, output[0].length), (7, 3));
        assert_eq!((output[1].offset, output[1].length), (18, 1));
    }

    #[test]
    fn test_entity_inside_mention_covers_replacement() {
        let entities = vec![Entity::styled(EntityStyle::Bold, 3, 4)];

        let (_, output) = rewrite_content("hi @someone", &entities, &rule());

        assert_eq!((output[0].offset, output[0].length), (3, 6));
    }

    #[test]
    fn test_offsets_count_utf16_units() {
        // "😀" is two UTF-16 code units
        let entities = vec![Entity::styled(EntityStyle::Bold, 11, 2)];

        let (text, output) = rewrite_content("😀 @abcdef 😀", &entities, &rule());

        assert_eq!(text, "😀 @relay 😀");
        assert_eq!((output[0].offset, output[0].length), (10, 2));
    }

    #[test]
    fn test_empty_entities() {
        assert!(rewrite_entities(&[], &rule()).is_empty());
    }
}
