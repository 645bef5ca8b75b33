// Content classification engine.
//
// Pure functions from (text, optional filename, rule snapshot) to a verdict.
// Evaluation order, first hit wins:
// 1. Ad signature + banned @handle combo
// 2. Direct keyword match (exact / fuzzy / regex)
// 3. Links (host or path)
// 4. @handle mentions
// 5. Filename, only when the text was clean
//
// Step 1 must stay first: it overrides the per-rule match kind.

use super::moderation_models::{CompiledRule, MatchKind, RuleSnapshot, Verdict, VerdictKind};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Phrasing typical of group-promotion spam.
const AD_SIGNATURES: &[&str] = &[
    r"(?i)广[告告]待?[发發]", // ad posting
    r"(?i)精准.*?[群裙]",     // "targeted ... group"
    r"(?i)私信.*?[拉私]人",   // "DM to pull members"
    r"(?i)强拉",
    r"(?i)引流",
    r"(?i)代开会员",
    r"(?i)包效果",
    r"(?i)双向",
    r"(?i)全行业",
    r"(?i)实时查看",
    r"(?i)分类群",
    r"(?i)活粉",
    r"(?i)\d+万.*?[群裙]", // "N万 ... group"
    r"(?i)代发",
];

static AD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    AD_SIGNATURES
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Classify a message (text or caption plus optional attachment filename).
pub fn classify(text: &str, file_name: Option<&str>, rules: &RuleSnapshot) -> Verdict {
    if rules.is_empty() {
        return Verdict::clean();
    }

    let verdict = classify_text(text, rules);
    if verdict.matched {
        return verdict;
    }

    match file_name {
        Some(name) if !name.is_empty() => classify_file_name(name, rules),
        _ => Verdict::clean(),
    }
}

/// Every text pass, in priority order.
pub fn classify_text(text: &str, rules: &RuleSnapshot) -> Verdict {
    if text.is_empty() {
        return Verdict::clean();
    }

    ad_with_mention(text, rules)
        .or_else(|| match_keywords(text, rules))
        .or_else(|| inspect_links(text, rules))
        .or_else(|| inspect_mentions(text, rules))
        .unwrap_or_else(Verdict::clean)
}

/// Filenames only get the direct keyword pass.
pub fn classify_file_name(file_name: &str, rules: &RuleSnapshot) -> Verdict {
    match_keywords(file_name, rules).unwrap_or_else(Verdict::clean)
}

fn has_ad_signature(text: &str) -> bool {
    AD_PATTERNS.iter().any(|re| re.is_match(text))
}

fn ad_with_mention(text: &str, rules: &RuleSnapshot) -> Option<Verdict> {
    if !has_ad_signature(text) {
        return None;
    }

    extract_mentions(text)
        .into_iter()
        .find_map(|handle| find_handle_rule(handle, rules))
        .map(|rule| Verdict::hit(&rule.rule, VerdictKind::AdHeuristic))
}

fn match_keywords(text: &str, rules: &RuleSnapshot) -> Option<Verdict> {
    let lower = text.to_lowercase();
    rules
        .rules()
        .iter()
        .find(|rule| rule_matches(rule, text, &lower))
        .map(|rule| Verdict::hit(&rule.rule, rule.rule.match_kind.into()))
}

/// Rules see links the way a user typed them: Unicode host, decoded path.
fn inspect_links(text: &str, rules: &RuleSnapshot) -> Option<Verdict> {
    for link in extract_links(text) {
        let (host, _) = idna::domain_to_unicode(link.host_str().unwrap_or_default());
        let path = percent_decode_str(link.path()).decode_utf8_lossy();
        let host_lower = host.to_lowercase();
        let path_lower = path.to_lowercase();

        let hit = rules.rules().iter().find(|rule| {
            rule_matches(rule, &host, &host_lower) || rule_matches(rule, &path, &path_lower)
        });
        if let Some(rule) = hit {
            return Some(Verdict::hit(&rule.rule, VerdictKind::Link));
        }
    }
    None
}

fn inspect_mentions(text: &str, rules: &RuleSnapshot) -> Option<Verdict> {
    extract_mentions(text)
        .into_iter()
        .find_map(|handle| find_handle_rule(handle, rules))
        .map(|rule| Verdict::hit(&rule.rule, VerdictKind::Username))
}

fn find_handle_rule<'a>(handle: &str, rules: &'a RuleSnapshot) -> Option<&'a CompiledRule> {
    rules
        .rules()
        .iter()
        .find(|rule| !rule.handle.is_empty() && rule.handle.eq_ignore_ascii_case(handle))
}

/// Apply one rule's match kind. `original` keeps its case for regex rules,
/// `lower` is the lower-cased copy used by exact and fuzzy rules.
fn rule_matches(rule: &CompiledRule, original: &str, lower: &str) -> bool {
    match rule.rule.match_kind {
        MatchKind::Exact => exact_match(lower, &rule.pattern_lower),
        MatchKind::Fuzzy => lower.contains(rule.pattern_lower.as_str()),
        MatchKind::Regex => rule
            .regex
            .as_ref()
            .map(|re| re.is_match(original))
            .unwrap_or(false),
    }
}

/// Token equality after stripping non-alphanumerics, or raw substring.
fn exact_match(lower: &str, keyword: &str) -> bool {
    token_match(lower, keyword) || lower.contains(keyword)
}

fn token_match(lower: &str, keyword: &str) -> bool {
    lower.split_whitespace().any(|word| {
        let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        cleaned == keyword
    })
}

/// `@handle` mentions (ASCII letters, digits, underscore), without the `@`.
pub fn extract_mentions(text: &str) -> Vec<&str> {
    let mut handles = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'@' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            if end > start {
                handles.push(&text[start..end]);
            }
            i = end.max(start);
        } else {
            i += 1;
        }
    }

    handles
}

/// Every `scheme://...` link plus bare `t.me/<name>` links. Tokens are
/// whitespace-delimited; ones that fail to parse are skipped.
pub fn extract_links(text: &str) -> Vec<Url> {
    text.split_whitespace().filter_map(link_in_token).collect()
}

fn link_in_token(token: &str) -> Option<Url> {
    if let Some(sep) = token.find("://") {
        // Walk back over scheme characters; the scheme must start with a letter.
        let head = &token[..sep];
        let scheme_len = head
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            .count();
        let mut start = sep - scheme_len;
        while start < sep && !token.as_bytes()[start].is_ascii_alphabetic() {
            start += 1;
        }
        if start == sep {
            return None;
        }
        return Url::parse(&token[start..]).ok();
    }

    let lower = token.to_ascii_lowercase();
    let at = lower.find("t.me/")?;
    Url::parse(&format!("https://{}", &token[at..])).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::{Rule, RuleAction};
    use chrono::Utc;

    fn rule(id: i64, pattern: &str, match_kind: MatchKind, action: RuleAction) -> Rule {
        Rule {
            id,
            pattern: pattern.to_string(),
            match_kind,
            action,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn snapshot(rules: Vec<Rule>) -> RuleSnapshot {
        RuleSnapshot::new(rules)
    }

    #[test]
    fn exact_matches_punctuated_token() {
        let rules = snapshot(vec![rule(1, "spam", MatchKind::Exact, RuleAction::Mute)]);

        let verdict = classify("this is spam!", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::Exact);
        assert_eq!(verdict.rule_id, Some(1));
    }

    #[test]
    fn exact_token_and_substring_paths_are_independent() {
        assert!(token_match("spam", "spam"));
        assert!(exact_match("spam", "spam"));

        assert!(!token_match("nospamhere", "spam"));
        assert!(exact_match("nospamhere", "spam"));

        let rules = snapshot(vec![rule(1, "spam", MatchKind::Exact, RuleAction::Mute)]);
        assert!(classify("nospamhere", None, &rules).matched);
        assert!(classify("spammer", None, &rules).matched);
    }

    #[test]
    fn exact_is_case_insensitive() {
        let rules = snapshot(vec![rule(1, "Casino", MatchKind::Exact, RuleAction::Kick)]);
        let verdict = classify("Visit our CASINO today", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.action, Some(RuleAction::Kick));
    }

    #[test]
    fn fuzzy_matches_substring() {
        let rules = snapshot(vec![rule(3, "crypto", MatchKind::Fuzzy, RuleAction::Mute)]);
        let verdict = classify("Best CryptoSignals here", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::Fuzzy);
        assert!(!classify("hello there", None, &rules).matched);
    }

    #[test]
    fn regex_matches_original_case_text() {
        let rules = snapshot(vec![rule(4, r"\d{5,}", MatchKind::Regex, RuleAction::Mute)]);
        let verdict = classify("call 123456 now", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::Regex);
        assert!(!classify("call 1234 now", None, &rules).matched);

        let case_sensitive = snapshot(vec![rule(5, "^FREE", MatchKind::Regex, RuleAction::Mute)]);
        assert!(classify("FREE stuff", None, &case_sensitive).matched);
        assert!(!classify("free stuff", None, &case_sensitive).matched);
    }

    #[test]
    fn invalid_regex_never_matches() {
        let rules = snapshot(vec![rule(6, "(", MatchKind::Regex, RuleAction::Kick)]);
        for text in ["(", "anything", "", "((((", "call 123456 now"] {
            assert!(!classify(text, None, &rules).matched, "matched {text:?}");
        }
    }

    #[test]
    fn invalid_regex_does_not_hide_later_rules() {
        let rules = snapshot(vec![
            rule(6, "(", MatchKind::Regex, RuleAction::Kick),
            rule(7, "promo", MatchKind::Fuzzy, RuleAction::Mute),
        ]);
        let verdict = classify("big promo", None, &rules);
        assert_eq!(verdict.rule_id, Some(7));
    }

    #[test]
    fn ad_signature_with_banned_handle_wins() {
        let rules = snapshot(vec![rule(
            8,
            "spammer123",
            MatchKind::Regex,
            RuleAction::Kick,
        )]);
        let verdict = classify("精准引流群 联系 @spammer123", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::AdHeuristic);
        assert_eq!(verdict.action, Some(RuleAction::Kick));
    }

    #[test]
    fn ad_heuristic_overrides_earlier_keyword_rule() {
        let rules = snapshot(vec![
            rule(1, "引流", MatchKind::Fuzzy, RuleAction::Mute),
            rule(2, "@Promoter", MatchKind::Exact, RuleAction::Kick),
        ]);
        let verdict = classify("专业引流 找 @promoter", None, &rules);
        assert_eq!(verdict.kind, VerdictKind::AdHeuristic);
        assert_eq!(verdict.rule_id, Some(2));
    }

    #[test]
    fn banned_handle_without_ad_signature_is_username_match() {
        let rules = snapshot(vec![rule(
            9,
            "@BadSeller",
            MatchKind::Regex,
            RuleAction::Mute,
        )]);
        // The regex "@BadSeller" is case-sensitive so the direct pass misses.
        let verdict = classify("ping @badseller for deals", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::Username);
    }

    #[test]
    fn link_host_is_inspected() {
        let rules = snapshot(vec![rule(
            10,
            "^evil\\.example$",
            MatchKind::Regex,
            RuleAction::Kick,
        )]);
        let verdict = classify("look https://evil.example/path?q=1", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::Link);
    }

    #[test]
    fn link_path_is_inspected() {
        let rules = snapshot(vec![rule(11, "^/joinchat", MatchKind::Regex, RuleAction::Kick)]);
        let verdict = classify("https://t.me/joinchat/abc", None, &rules);
        assert_eq!(verdict.kind, VerdictKind::Link);
    }

    #[test]
    fn link_path_is_matched_decoded() {
        let rules = snapshot(vec![rule(13, "^/广告", MatchKind::Regex, RuleAction::Kick)]);
        let verdict = classify("https://x.example/广告", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::Link);
        assert_eq!(verdict.rule_id, Some(13));

        let escaped = classify("https://x.example/%E5%B9%BF%E5%91%8A/more", None, &rules);
        assert_eq!(escaped.kind, VerdictKind::Link);
    }

    #[test]
    fn link_host_is_matched_in_unicode() {
        let rules = snapshot(vec![rule(14, "^例子\\.测试$", MatchKind::Regex, RuleAction::Kick)]);
        let verdict = classify("https://例子.测试/x", None, &rules);
        assert!(verdict.matched);
        assert_eq!(verdict.kind, VerdictKind::Link);

        let punycode = classify("https://xn--fsqu00a.xn--0zwm56d/x", None, &rules);
        assert_eq!(punycode.rule_id, Some(14));
    }

    #[test]
    fn bare_telegram_links_are_inspected() {
        let links = extract_links("join t.me/cheapgroup now");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].host_str(), Some("t.me"));
        assert_eq!(links[0].path(), "/cheapgroup");
    }

    #[test]
    fn malformed_links_are_skipped() {
        assert!(extract_links("http:// broken and ://nothing").is_empty());
        let rules = snapshot(vec![rule(12, "zzz", MatchKind::Fuzzy, RuleAction::Mute)]);
        assert!(!classify("http://[::1 broken", None, &rules).matched);
    }

    #[test]
    fn scheme_is_found_inside_glued_token() {
        let links = extract_links("看这里https://spam.example/x");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].host_str(), Some("spam.example"));
    }

    #[test]
    fn mentions_are_extracted_without_at_sign() {
        assert_eq!(
            extract_mentions("hi @alice and @bob_2, mail me@ x @"),
            vec!["alice", "bob_2"]
        );
    }

    #[test]
    fn file_name_checked_only_when_text_is_clean() {
        let rules = snapshot(vec![
            rule(1, "hello", MatchKind::Fuzzy, RuleAction::Mute),
            rule(2, ".apk", MatchKind::Fuzzy, RuleAction::Kick),
        ]);

        let verdict = classify("hello", Some("installer.apk"), &rules);
        assert_eq!(verdict.rule_id, Some(1));

        let verdict = classify("nothing here", Some("installer.APK"), &rules);
        assert_eq!(verdict.rule_id, Some(2));

        let verdict = classify("", Some("installer.apk"), &rules);
        assert_eq!(verdict.rule_id, Some(2));
    }

    #[test]
    fn file_name_skips_mention_and_link_passes() {
        let rules = snapshot(vec![rule(1, "^x$", MatchKind::Regex, RuleAction::Kick)]);
        assert!(!classify("", Some("@x"), &rules).matched);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = snapshot(vec![
            rule(1, "deal", MatchKind::Fuzzy, RuleAction::Mute),
            rule(2, "deal", MatchKind::Exact, RuleAction::Kick),
        ]);
        let verdict = classify("great deal", None, &rules);
        assert_eq!(verdict.rule_id, Some(1));
        assert_eq!(verdict.action, Some(RuleAction::Mute));
    }

    #[test]
    fn classification_is_deterministic() {
        let rules = snapshot(vec![
            rule(1, "spam", MatchKind::Exact, RuleAction::Mute),
            rule(2, r"\d{5,}", MatchKind::Regex, RuleAction::Kick),
            rule(3, "@seller", MatchKind::Fuzzy, RuleAction::Kick),
        ]);
        for text in ["this is spam!", "call 123456", "@seller 全行业", "clean text"] {
            assert_eq!(classify(text, None, &rules), classify(text, None, &rules));
        }
    }

    #[test]
    fn empty_snapshot_is_always_clean() {
        let rules = RuleSnapshot::default();
        assert_eq!(classify("精准引流群 @x", Some("a.exe"), &rules), Verdict::clean());
    }
}
