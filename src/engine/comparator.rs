//! Relational operators used by wake clauses and "last" expectations

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Comparator {
    /// Two-character symbols must be tried before their one-character prefixes
    const SYMBOLS: [(&'static str, Comparator); 5] = [
        (">=", Self::Ge),
        ("<=", Self::Le),
        ("==", Self::Eq),
        (">", Self::Gt),
        ("<", Self::Lt),
    ];

    /// Parse an exact operator symbol
    pub fn parse(symbol: &str) -> Option<Self> {
        Self::SYMBOLS
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, c)| *c)
    }

    /// Split a leading operator symbol off `text`
    pub fn split_prefix(text: &str) -> Option<(Self, &str)> {
        Self::SYMBOLS
            .iter()
            .find_map(|(s, c)| text.strip_prefix(*s).map(|rest| (*c, rest)))
    }

    /// Whether `lhs <op> rhs` holds
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_symbols() {
        assert_eq!(Comparator::parse(">="), Some(Comparator::Ge));
        assert_eq!(Comparator::parse("<"), Some(Comparator::Lt));
        assert_eq!(Comparator::parse("="), None);
        assert_eq!(Comparator::parse(""), None);
    }

    #[test]
    fn test_split_prefix_prefers_longest() {
        assert_eq!(Comparator::split_prefix("<=45%"), Some((Comparator::Le, "45%")));
        assert_eq!(Comparator::split_prefix(">3"), Some((Comparator::Gt, "3")));
        assert_eq!(Comparator::split_prefix("==1"), Some((Comparator::Eq, "1")));
        assert_eq!(Comparator::split_prefix("45"), None);
    }

    #[test]
    fn test_holds() {
        assert!(Comparator::Le.holds(0.40, 0.45));
        assert!(!Comparator::Gt.holds(5.0, 5.0));
        assert!(Comparator::Ge.holds(5.0, 5.0));
        assert!(Comparator::Eq.holds(1.0, 1.0));
    }
}
