//! Turns raw `[[...]]` markup into canonical article titles.
//!
//! Per link, in order: strip the delimiters, drop the display alias after the
//! first `|`, drop the section anchor after the first `#`, classify the
//! namespace (text before the first `:`, "Main" when absent or empty), and
//! for Main-namespace links normalize the title: runs of `_` become one space,
//! surrounding whitespace is trimmed and the first character is upper-cased.

use crate::content::extract_links;
use crate::models::{PageLinks, PageRecord, WikiLink};
use rustc_hash::FxHashSet;

pub const MAIN_NAMESPACE: &str = "Main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    /// A Main-namespace link with its canonical target title.
    Valid(String),
    /// A link into another namespace (the namespace prefix).
    Namespaced(String),
    /// Nothing left to link to, e.g. `[[#Section]]` or `[[|x]]`.
    EmptyTarget,
}

pub fn strip_delimiters(markup: &str) -> &str {
    let inner = markup.strip_prefix("[[").unwrap_or(markup);
    inner.strip_suffix("]]").unwrap_or(inner)
}

/// Delimiter, alias and section stripping.
pub fn link_target(markup: &str) -> &str {
    let inner = strip_delimiters(markup);
    let unaliased = inner.split('|').next().unwrap_or(inner);
    unaliased.split('#').next().unwrap_or(unaliased)
}

pub fn namespace_of(target: &str) -> &str {
    match target.split_once(':') {
        Some((ns, _)) if !ns.is_empty() => ns,
        _ => MAIN_NAMESPACE,
    }
}

/// MediaWiki-style title normalization. Idempotent.
pub fn canonical_title(target: &str) -> String {
    let mut collapsed = String::with_capacity(target.len());
    let mut in_run = false;
    for c in target.chars() {
        if c == '_' {
            if !in_run {
                collapsed.push(' ');
            }
            in_run = true;
        } else {
            collapsed.push(c);
            in_run = false;
        }
    }

    let mut chars = collapsed.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn canonicalize(markup: &str) -> Canonical {
    let target = link_target(markup);

    let namespace = namespace_of(target);
    if namespace != MAIN_NAMESPACE {
        return Canonical::Namespaced(namespace.to_string());
    }
    if target.is_empty() {
        return Canonical::EmptyTarget;
    }

    // Whitespace-only targets normalize to nothing as well.
    let title = canonical_title(target);
    if title.is_empty() {
        Canonical::EmptyTarget
    } else {
        Canonical::Valid(title)
    }
}

/// Extracts and canonicalizes every link of a page, keeping the first
/// occurrence of each canonical target.
pub fn page_links(page: &PageRecord) -> PageLinks {
    let raw = extract_links(&page.title, &page.text);
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut result = PageLinks {
        title: page.title.clone(),
        links: Vec::new(),
        raw: raw.len() as u64,
        rejected: 0,
        duplicates: 0,
    };

    for link in raw {
        match canonicalize(link.markup) {
            Canonical::Valid(target) => {
                if seen.insert(target.clone()) {
                    result.links.push(WikiLink {
                        source: link.source.to_string(),
                        target,
                    });
                } else {
                    result.duplicates += 1;
                }
            }
            Canonical::Namespaced(_) | Canonical::EmptyTarget => result.rejected += 1,
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(markup: &str) -> String {
        match canonicalize(markup) {
            Canonical::Valid(t) => t,
            other => panic!("{markup} was not valid: {other:?}"),
        }
    }

    fn page(title: &str, text: &str) -> PageRecord {
        PageRecord {
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn plain_link() {
        assert_eq!(valid("[[Foo Bar]]"), "Foo Bar");
    }

    #[test]
    fn alias_is_dropped() {
        assert_eq!(valid("[[Target|Display Text]]"), "Target");
    }

    #[test]
    fn section_and_alias_are_dropped() {
        assert_eq!(valid("[[Target#Section|Display]]"), "Target");
        assert_eq!(valid("[[Target#Section]]"), "Target");
    }

    #[test]
    fn category_is_rejected() {
        assert_eq!(
            canonicalize("[[Category:Foo]]"),
            Canonical::Namespaced("Category".to_string())
        );
    }

    #[test]
    fn namespace_taken_after_alias_strip() {
        // The colon lives in the alias, so the target stays in Main.
        assert_eq!(valid("[[Ratio|1:2]]"), "Ratio");
    }

    #[test]
    fn leading_colon_stays_in_main() {
        assert_eq!(valid("[[:Foo]]"), ":Foo");
    }

    #[test]
    fn section_only_link_is_empty() {
        assert_eq!(canonicalize("[[#History]]"), Canonical::EmptyTarget);
        assert_eq!(canonicalize("[[|alias]]"), Canonical::EmptyTarget);
        assert_eq!(canonicalize("[[ _ ]]"), Canonical::EmptyTarget);
    }

    #[test]
    fn underscores_trim_and_case() {
        assert_eq!(valid("[[hello__big_world]]"), "Hello big world");
        assert_eq!(valid("[[  padded  ]]"), "Padded");
        assert_eq!(valid("[[_lead]]"), "Lead");
        assert_eq!(valid("[[iPhone]]"), "IPhone");
        assert_eq!(valid("[[éclair]]"), "Éclair");
    }

    #[test]
    fn rest_of_title_is_untouched() {
        assert_eq!(valid("[[foo BAR  baz]]"), "Foo BAR  baz");
    }

    #[test]
    fn canonical_title_is_idempotent() {
        for raw in ["dog", "Foo_Bar", " a__b ", "Already Canonical", "ßtraße", ":x"] {
            let once = canonical_title(raw);
            assert_eq!(canonical_title(&once), once);
            assert_eq!(valid(&format!("[[{once}]]")), once);
        }
    }

    #[test]
    fn dedup_after_canonicalization() {
        let links = page_links(&page("Pets", "[[Dog]], [[Dog]] and [[dog]]"));
        assert_eq!(
            links.links,
            vec![WikiLink {
                source: "Pets".to_string(),
                target: "Dog".to_string()
            }]
        );
        assert_eq!(links.raw, 3);
        assert_eq!(links.duplicates, 2);
    }

    #[test]
    fn dedup_across_aliases_and_sections() {
        let links = page_links(&page("P", "[[Rust_language|Rust]] [[Rust language#History]]"));
        assert_eq!(links.links.len(), 1);
        assert_eq!(links.links[0].target, "Rust language");
    }

    #[test]
    fn keeps_first_occurrence_order() {
        let links = page_links(&page("P", "[[C]] [[a]] [[B]] [[A]] [[c]]"));
        let targets: Vec<_> = links.links.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, vec!["C", "A", "B"]);
    }

    #[test]
    fn counts_rejections() {
        let links = page_links(&page(
            "P",
            "See [[Page B]] and [[Category:Ignore]] [[File:X.png|thumb]] [[#Top]]",
        ));
        assert_eq!(links.links.len(), 1);
        assert_eq!(links.links[0].target, "Page B");
        assert_eq!(links.rejected, 3);
    }

    #[test]
    fn self_link_is_kept() {
        let links = page_links(&page("Loop", "[[Loop]]"));
        assert_eq!(links.links[0].source, "Loop");
        assert_eq!(links.links[0].target, "Loop");
    }

    #[test]
    fn source_title_is_not_rewritten() {
        let links = page_links(&page("lower_case title", "[[x]]"));
        assert_eq!(links.title, "lower_case title");
        assert_eq!(links.links[0].source, "lower_case title");
    }

    #[test]
    fn page_without_links() {
        let links = page_links(&page("Empty", ""));
        assert!(links.links.is_empty());
        assert_eq!(links.raw, 0);
    }
}
