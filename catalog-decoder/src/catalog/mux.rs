//! Multiplexed signal tree
//!
//! A mux table in the catalog carries its selector (`start_bit`, `bit_length`,
//! optional `name`, `byte_order`, `layout`) next to case tables keyed by case-key
//! strings. Each case holds `signals` and optionally a nested `mux`.
//!
//! Case matching is deterministic: single values first, then ranges, then lists.
//! Within each class the first case in definition order wins. Overlapping keys
//! are not reported.

use super::raw::RawSignal;
use super::model::ResolvedSignal;
use crate::codec::bits;
use crate::types::Endianness;
use toml::Value;

/// Maximum nesting depth of mux tables; deeper levels are dropped
pub const MAX_MUX_DEPTH: usize = 8;

/// Widest selector field accepted
const MAX_SELECTOR_BITS: usize = 64;

/// Keys of a mux table that describe the selector rather than a case
const SELECTOR_KEYS: [&str; 5] = ["name", "start_bit", "bit_length", "byte_order", "layout"];

/// Case key parsed from strings such as `"1"`, `"0-3"`, `"1,2,5"` or `"0x1A"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseKey {
    Single(u64),
    Range(u64, u64),
    List(Vec<u64>),
}

fn parse_u64(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl CaseKey {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.contains(',') {
            let values = text
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(parse_u64)
                .collect::<Option<Vec<_>>>()?;
            return if values.is_empty() { None } else { Some(CaseKey::List(values)) };
        }
        if let Some((lo, hi)) = text.split_once('-') {
            let (lo, hi) = (parse_u64(lo)?, parse_u64(hi)?);
            return if lo <= hi { Some(CaseKey::Range(lo, hi)) } else { None };
        }
        parse_u64(text).map(CaseKey::Single)
    }

    pub fn matches(&self, value: u64) -> bool {
        match self {
            CaseKey::Single(v) => *v == value,
            CaseKey::Range(lo, hi) => (*lo..=*hi).contains(&value),
            CaseKey::List(values) => values.contains(&value),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            CaseKey::Single(_) => 0,
            CaseKey::Range(..) => 1,
            CaseKey::List(_) => 2,
        }
    }
}

fn match_position<'a, I>(value: u64, keys: I) -> Option<usize>
where
    I: Iterator<Item = &'a CaseKey> + Clone,
{
    (0..3u8).find_map(|class| {
        keys.clone()
            .position(|key| key.precedence() == class && key.matches(value))
    })
}

/// Find the case key that selects `value`
pub fn match_case(value: u64, keys: &[CaseKey]) -> Option<&CaseKey> {
    match_position(value, keys.iter()).map(|i| &keys[i])
}

/// Storage key of a 2D mux case
pub fn encode_2d_key(outer: u8, inner: u8) -> u64 {
    u64::from(outer) << 8 | u64::from(inner)
}

/// Split a 2D storage key into its outer and inner selector values
pub fn split_2d_key(key: u64) -> Option<(u8, u8)> {
    let key = u16::try_from(key).ok()?;
    Some(((key >> 8) as u8, key as u8))
}

/// One case of a mux
#[derive(Debug, Clone, PartialEq)]
pub struct MuxCase {
    pub key: CaseKey,
    pub signals: Vec<ResolvedSignal>,
    pub nested: Option<Box<MuxNode>>,
}

/// A selector field and the cases it chooses between
#[derive(Debug, Clone, PartialEq)]
pub struct MuxNode {
    pub name: Option<String>,
    pub start_bit: usize,
    pub bit_length: usize,
    pub byte_order: Endianness,
    /// Two-byte mux: each case nests a mux on the following byte
    pub is_2d: bool,
    pub cases: Vec<MuxCase>,
}

impl MuxNode {
    /// Read the selector value from a payload
    pub fn selector(&self, data: &[u8]) -> Option<u64> {
        bits::extract_unsigned(data, self.start_bit, self.bit_length, self.byte_order)
            .and_then(|v| u64::try_from(v).ok())
    }

    /// The case chosen by `value`, if any
    pub fn select(&self, value: u64) -> Option<&MuxCase> {
        match_position(value, self.cases.iter().map(|c| &c.key)).map(|i| &self.cases[i])
    }

    /// Number of signals over all cases at all depths
    pub fn signal_count(&self) -> usize {
        self.cases
            .iter()
            .map(|c| c.signals.len() + c.nested.as_ref().map_or(0, |n| n.signal_count()))
            .sum()
    }

    /// Storage keys (`outer * 256 + inner`) of a 2D mux
    pub fn flat_keys(&self) -> Vec<u64> {
        if !self.is_2d {
            return Vec::new();
        }
        let mut keys = Vec::new();
        for case in &self.cases {
            let (CaseKey::Single(outer), Some(inner)) = (&case.key, &case.nested) else {
                continue;
            };
            for inner_case in &inner.cases {
                if let CaseKey::Single(inner_value) = inner_case.key {
                    keys.push(outer << 8 | inner_value);
                }
            }
        }
        keys
    }

    /// Mark every signal in the tree as inherited from a mirrored frame
    pub(crate) fn mark_inherited(&mut self) {
        for case in &mut self.cases {
            case.signals.iter_mut().for_each(|s| s.inherited = true);
            if let Some(nested) = case.nested.as_mut() {
                nested.mark_inherited();
            }
        }
    }
}

/// Builds [`MuxNode`] trees from raw mux tables
///
/// `resolve_signal` applies defaults and bounds checks to each case signal;
/// returning `None` drops the signal.
pub struct MuxParser<'f> {
    default_order: Endianness,
    resolve_signal: &'f dyn Fn(&RawSignal) -> Option<ResolvedSignal>,
}

impl<'f> MuxParser<'f> {
    pub fn new(
        default_order: Endianness,
        resolve_signal: &'f dyn Fn(&RawSignal) -> Option<ResolvedSignal>,
    ) -> Self {
        Self {
            default_order,
            resolve_signal,
        }
    }

    pub fn parse(&self, raw: &toml::Table) -> Option<MuxNode> {
        self.parse_node(raw, 0)
    }

    fn parse_node(&self, raw: &toml::Table, depth: usize) -> Option<MuxNode> {
        if depth >= MAX_MUX_DEPTH {
            log::debug!("Mux nesting deeper than {} levels dropped", MAX_MUX_DEPTH);
            return None;
        }

        let name = raw.get("name").and_then(Value::as_str).map(str::to_string);
        let start_bit = int_field(raw, "start_bit").unwrap_or(0);
        let byte_order = raw
            .get("byte_order")
            .and_then(|v| v.clone().try_into::<Endianness>().ok())
            .unwrap_or(self.default_order);
        let is_2d = raw.get("layout").and_then(Value::as_str) == Some("2d");
        let span = if is_2d { 16 } else { int_field(raw, "bit_length").unwrap_or(8) };
        if start_bit.checked_add(span).and_then(|end| end.checked_add(7)).is_none() {
            log::debug!("Mux selector at bit {} out of range, dropped", start_bit);
            return None;
        }

        if is_2d {
            return Some(self.parse_2d(raw, name, start_bit, byte_order, depth));
        }

        let bit_length = int_field(raw, "bit_length").unwrap_or(8);
        if bit_length == 0 || bit_length > MAX_SELECTOR_BITS {
            log::debug!("Mux selector with {} bits dropped", bit_length);
            return None;
        }

        let cases = self
            .case_tables(raw)
            .map(|(key, table)| self.parse_case(key, table, depth))
            .collect();

        Some(MuxNode {
            name,
            start_bit,
            bit_length,
            byte_order,
            is_2d: false,
            cases,
        })
    }

    /// Outer node on the first byte, one nested node per outer value on the second
    fn parse_2d(
        &self,
        raw: &toml::Table,
        name: Option<String>,
        start_bit: usize,
        byte_order: Endianness,
        depth: usize,
    ) -> MuxNode {
        let mut groups: Vec<(u8, Vec<MuxCase>)> = Vec::new();

        for (key, table) in self.case_tables(raw) {
            let Some((outer, inner)) = (match key {
                CaseKey::Single(value) => split_2d_key(value),
                _ => None,
            }) else {
                log::debug!("2D mux case key must be a single value up to 0xFFFF, skipped");
                continue;
            };

            let case = self.parse_case(CaseKey::Single(u64::from(inner)), table, depth + 1);
            match groups.iter_mut().find(|(o, _)| *o == outer) {
                Some((_, cases)) => cases.push(case),
                None => groups.push((outer, vec![case])),
            }
        }

        let cases = groups
            .into_iter()
            .map(|(outer, inner_cases)| MuxCase {
                key: CaseKey::Single(u64::from(outer)),
                signals: Vec::new(),
                nested: Some(Box::new(MuxNode {
                    name: None,
                    start_bit: start_bit + 8,
                    bit_length: 8,
                    byte_order,
                    is_2d: false,
                    cases: inner_cases,
                })),
            })
            .collect();

        MuxNode {
            name,
            start_bit,
            bit_length: 8,
            byte_order,
            is_2d: true,
            cases,
        }
    }

    fn case_tables<'t>(
        &self,
        raw: &'t toml::Table,
    ) -> impl Iterator<Item = (CaseKey, &'t toml::Table)> + 't {
        raw.iter()
            .filter(|(key, _)| !SELECTOR_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| {
                let table = value.as_table()?;
                match CaseKey::parse(key) {
                    Some(case_key) => Some((case_key, table)),
                    None => {
                        log::debug!("Unparsable mux case key '{}' skipped", key);
                        None
                    }
                }
            })
    }

    fn parse_case(&self, key: CaseKey, table: &toml::Table, depth: usize) -> MuxCase {
        let signals = table
            .get("signals")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| match entry.clone().try_into::<RawSignal>() {
                        Ok(raw) => (self.resolve_signal)(&raw),
                        Err(e) => {
                            log::debug!("Malformed mux signal skipped: {}", e);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let nested = table
            .get("mux")
            .and_then(Value::as_table)
            .and_then(|nested| self.parse_node(nested, depth + 1))
            .map(Box::new);

        MuxCase { key, signals, nested }
    }
}

fn int_field(raw: &toml::Table, key: &str) -> Option<usize> {
    raw.get(key)
        .and_then(Value::as_integer)
        .and_then(|v| usize::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::raw::Confidence;
    use crate::codec::SignalFormat;
    use rust_decimal::Decimal;

    fn resolve(raw: &RawSignal) -> Option<ResolvedSignal> {
        Some(ResolvedSignal {
            name: raw.name.clone(),
            start_bit: raw.start_bit,
            bit_length: raw.bit_length,
            signed: false,
            endianness: Endianness::Little,
            word_order: None,
            factor: Decimal::ONE,
            offset: Decimal::ZERO,
            unit: None,
            format: SignalFormat::Numeric,
            enum_map: None,
            confidence: Confidence::None,
            inherited: false,
        })
    }

    fn parse(text: &str) -> Option<MuxNode> {
        let table: toml::Table = toml::from_str(text).unwrap();
        MuxParser::new(Endianness::Little, &resolve).parse(&table)
    }

    #[test]
    fn test_case_key_parsing() {
        assert_eq!(CaseKey::parse("1"), Some(CaseKey::Single(1)));
        assert_eq!(CaseKey::parse("0x1A"), Some(CaseKey::Single(0x1A)));
        assert_eq!(CaseKey::parse("0-3"), Some(CaseKey::Range(0, 3)));
        assert_eq!(CaseKey::parse("1, 2,5"), Some(CaseKey::List(vec![1, 2, 5])));
        assert_eq!(CaseKey::parse("5-2"), None);
        assert_eq!(CaseKey::parse("abc"), None);
    }

    #[test]
    fn test_exact_match_beats_range() {
        let keys = vec![CaseKey::Range(0, 3), CaseKey::Single(0), CaseKey::List(vec![0, 9])];
        assert_eq!(match_case(0, &keys), Some(&CaseKey::Single(0)));
        assert_eq!(match_case(2, &keys), Some(&CaseKey::Range(0, 3)));
        assert_eq!(match_case(9, &keys), Some(&CaseKey::List(vec![0, 9])));
        assert_eq!(match_case(10, &keys), None);
    }

    #[test]
    fn test_first_case_wins_on_overlap() {
        let keys = vec![CaseKey::Range(0, 5), CaseKey::Range(3, 8)];
        assert_eq!(match_case(4, &keys), Some(&CaseKey::Range(0, 5)));
    }

    #[test]
    fn test_parse_nested_mux() {
        let node = parse(
            r#"
            name = "page"
            start_bit = 0
            bit_length = 4

            [[0.signals]]
            name = "a"
            start_bit = 8
            bit_length = 8

            [1.mux]
            start_bit = 4
            bit_length = 4

            [[1.mux."2-3".signals]]
            name = "b"
            start_bit = 8
            bit_length = 8
            "#,
        )
        .unwrap();

        assert_eq!(node.name.as_deref(), Some("page"));
        assert_eq!(node.bit_length, 4);
        assert_eq!(node.cases.len(), 2);
        assert_eq!(node.select(0).unwrap().signals[0].name, "a");

        let nested = node.select(1).unwrap().nested.as_ref().unwrap();
        assert_eq!(nested.start_bit, 4);
        assert_eq!(nested.select(3).unwrap().signals[0].name, "b");
        assert_eq!(node.signal_count(), 2);
    }

    #[test]
    fn test_invalid_selector_width() {
        assert!(parse("bit_length = 0").is_none());
        assert!(parse("bit_length = 65").is_none());
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut table = toml::Table::new();
        for _ in 0..(MAX_MUX_DEPTH + 4) {
            let mut case = toml::Table::new();
            case.insert("mux".to_string(), Value::Table(table));
            let mut node = toml::Table::new();
            node.insert("0".to_string(), Value::Table(case));
            table = node;
        }

        let root = MuxParser::new(Endianness::Little, &resolve).parse(&table).unwrap();
        let mut depth = 1;
        let mut node = &root;
        while let Some(next) = node.cases.first().and_then(|c| c.nested.as_deref()) {
            node = next;
            depth += 1;
        }
        assert_eq!(depth, MAX_MUX_DEPTH);
    }

    #[test]
    fn test_two_dimensional_mux() {
        let node = parse(
            r#"
            start_bit = 0
            layout = "2d"

            [[258.signals]]
            name = "x"
            start_bit = 16
            bit_length = 8

            [[0x0103.signals]]
            name = "y"
            start_bit = 16
            bit_length = 8

            [[0x0201.signals]]
            name = "z"
            start_bit = 16
            bit_length = 8
            "#,
        )
        .unwrap();

        assert!(node.is_2d);
        assert_eq!(node.bit_length, 8);
        assert_eq!(node.cases.len(), 2);
        assert_eq!(node.flat_keys(), vec![0x0102, 0x0103, 0x0201]);

        let inner = node.select(1).unwrap().nested.as_ref().unwrap();
        assert_eq!(inner.start_bit, 8);
        assert_eq!(inner.select(3).unwrap().signals[0].name, "y");
        assert_eq!(split_2d_key(encode_2d_key(2, 1)), Some((2, 1)));
    }
}
