use std::collections::HashSet;

use crate::parser::ParsedRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

/// Drop repeated rules, keeping the first occurrence of each.
///
/// Two rules are duplicates when action, pattern and option masks all agree.
pub fn optimize_rules(rules: &mut Vec<ParsedRule>) -> OptimizeStats {
    let before = rules.len();

    let mut seen: HashSet<ParsedRule> = HashSet::with_capacity(before);
    let mut deduped = 0usize;
    rules.retain(|rule| {
        if seen.contains(rule) {
            deduped += 1;
            false
        } else {
            seen.insert(rule.clone());
            true
        }
    });

    OptimizeStats {
        before,
        after: rules.len(),
        deduped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rule_list;

    #[test]
    fn test_dedupe_keeps_first() {
        let mut rules = parse_rule_list("ad_img\nad_script\nad_img$image\n@@ad_img\nad_img\nad_script\n").rules;
        let stats = optimize_rules(&mut rules);

        assert_eq!(stats.before, 6);
        assert_eq!(stats.deduped, 2);
        assert_eq!(stats.after, 4);
        assert_eq!(rules[0].rule.pattern.as_str(), "ad_img");
    }

    #[test]
    fn test_empty_input() {
        let mut rules = Vec::new();
        assert_eq!(optimize_rules(&mut rules), OptimizeStats::default());
    }
}
