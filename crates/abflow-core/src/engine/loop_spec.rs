use crate::core::models::chain::ChainRole;
use crate::core::models::loops::LoopLabel;
use crate::core::models::record::StructureRecord;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LoopSpecError {
    #[error("Malformed loop token '{0}' (expected LABEL, LABEL:N or LABEL:MIN-MAX)")]
    MalformedToken(String),
    #[error("Unknown loop label '{0}'")]
    UnknownLabel(String),
    #[error("Loop {0} is listed more than once")]
    DuplicateLabel(LoopLabel),
    #[error("Loop {label} has a length range starting at {min}; lengths must be at least 1")]
    ZeroLength { label: LoopLabel, min: usize },
    #[error("Loop {label} has min {min} greater than max {max}")]
    InvertedRange {
        label: LoopLabel,
        min: usize,
        max: usize,
    },
    #[error("Loop {0} is requested but the framework has no light chain")]
    NoLightChain(LoopLabel),
    #[error("Loop {0} keeps its current length but the framework does not annotate it")]
    MissingLoop(LoopLabel),
}

/// How a designed loop's length is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopLength {
    /// Redesign the loop but keep its current length.
    Keep,
    /// Draw a length uniformly from the inclusive range.
    Range { min: usize, max: usize },
}

/// The loops to redesign and their allowed lengths, parsed from expressions such as
/// `H1:7,H2:6,H3:5-13,L1:8-13,L2:7,L3:9-11`.
///
/// Labels absent from the spec are not designed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoopSpec {
    entries: BTreeMap<LoopLabel, LoopLength>,
}

fn parse_length(token: &str) -> Option<usize> {
    token.trim().parse().ok()
}

impl LoopSpec {
    pub fn parse(expression: &str) -> Result<Self, LoopSpecError> {
        let mut entries = BTreeMap::new();
        for token in expression.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (label_str, length) = match token.split_once(':') {
                Some((label, length)) => (label, Some(length.trim())),
                None => (token, None),
            };
            let label: LoopLabel = label_str
                .parse()
                .map_err(|_| LoopSpecError::UnknownLabel(label_str.trim().to_string()))?;

            let length = match length {
                None | Some("") => LoopLength::Keep,
                Some(range) => {
                    let malformed = || LoopSpecError::MalformedToken(token.to_string());
                    let (min, max) = match range.split_once('-') {
                        Some((min, max)) => (
                            parse_length(min).ok_or_else(malformed)?,
                            parse_length(max).ok_or_else(malformed)?,
                        ),
                        None => {
                            let n = parse_length(range).ok_or_else(malformed)?;
                            (n, n)
                        }
                    };
                    if min == 0 {
                        return Err(LoopSpecError::ZeroLength { label, min });
                    }
                    if min > max {
                        return Err(LoopSpecError::InvertedRange { label, min, max });
                    }
                    LoopLength::Range { min, max }
                }
            };

            if entries.insert(label, length).is_some() {
                return Err(LoopSpecError::DuplicateLabel(label));
            }
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, label: LoopLabel) -> Option<LoopLength> {
        self.entries.get(&label).copied()
    }

    /// Every loop that is redesigned, whether or not its length changes.
    pub fn labels(&self) -> BTreeSet<LoopLabel> {
        self.entries.keys().copied().collect()
    }

    /// Draws one length per ranged loop, independently and uniformly from its inclusive
    /// range. Loops that keep their length are not included.
    ///
    /// Labels are visited in their fixed order, so the same random stream always
    /// produces the same assignment.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BTreeMap<LoopLabel, usize> {
        self.entries
            .iter()
            .filter_map(|(label, length)| match length {
                LoopLength::Keep => None,
                LoopLength::Range { min, max } => Some((*label, rng.gen_range(*min..=*max))),
            })
            .collect()
    }

    /// Checks that the spec can be applied to `framework`.
    pub fn validate_against(&self, framework: &StructureRecord) -> Result<(), LoopSpecError> {
        for (label, length) in &self.entries {
            if label.chain_role() == ChainRole::Light && !framework.has_light() {
                return Err(LoopSpecError::NoLightChain(*label));
            }
            if *length == LoopLength::Keep && framework.loop_positions(*label).is_none() {
                return Err(LoopSpecError::MissingLoop(*label));
            }
        }
        Ok(())
    }
}

impl FromStr for LoopSpec {
    type Err = LoopSpecError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LoopSpec {
    type Error = LoopSpecError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LoopSpec> for String {
    fn from(spec: LoopSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for LoopSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self
            .entries
            .iter()
            .map(|(label, length)| match length {
                LoopLength::Keep => label.to_string(),
                LoopLength::Range { min, max } if min == max => format!("{label}:{min}"),
                LoopLength::Range { min, max } => format!("{label}:{min}-{max}"),
            })
            .collect();
        f.write_str(&tokens.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::record::tests::{chain, sample_record};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parse_accepts_all_token_forms() {
        let spec = LoopSpec::parse("H1:7, H2:, H3:5-13, l1").unwrap();
        assert_eq!(spec.get(LoopLabel::H1), Some(LoopLength::Range { min: 7, max: 7 }));
        assert_eq!(spec.get(LoopLabel::H2), Some(LoopLength::Keep));
        assert_eq!(spec.get(LoopLabel::H3), Some(LoopLength::Range { min: 5, max: 13 }));
        assert_eq!(spec.get(LoopLabel::L1), Some(LoopLength::Keep));
        assert_eq!(spec.get(LoopLabel::L2), None);
        assert_eq!(spec.to_string(), "H1:7,H2,H3:5-13,L1");
    }

    #[test]
    fn parse_rejects_invalid_expressions() {
        assert_eq!(
            LoopSpec::parse("H4:5"),
            Err(LoopSpecError::UnknownLabel("H4".into()))
        );
        assert_eq!(
            LoopSpec::parse("H3:9-5"),
            Err(LoopSpecError::InvertedRange {
                label: LoopLabel::H3,
                min: 9,
                max: 5
            })
        );
        assert_eq!(
            LoopSpec::parse("H3:0-5"),
            Err(LoopSpecError::ZeroLength {
                label: LoopLabel::H3,
                min: 0
            })
        );
        assert_eq!(
            LoopSpec::parse("H3:a-5"),
            Err(LoopSpecError::MalformedToken("H3:a-5".into()))
        );
        assert_eq!(
            LoopSpec::parse("H3:5,H3:6"),
            Err(LoopSpecError::DuplicateLabel(LoopLabel::H3))
        );
    }

    #[test]
    fn sample_stays_in_range_and_is_roughly_uniform() {
        let spec = LoopSpec::parse("H3:5-13").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 14];
        for _ in 0..10_000 {
            let sampled = spec.sample(&mut rng);
            let length = sampled[&LoopLabel::H3];
            assert!((5..=13).contains(&length));
            counts[length] += 1;
        }
        let expected = 10_000.0 / 9.0;
        for count in &counts[5..=13] {
            assert!((*count as f64 - expected).abs() < expected * 0.15);
        }
    }

    #[test]
    fn labels_are_sampled_independently() {
        let joint_spec = LoopSpec::parse("H1:1-3,H3:1-3").unwrap();
        let alone_spec = LoopSpec::parse("H1:1-3").unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let draws = 9_000;
        let mut joint = [[0usize; 4]; 4];
        let mut h1_alone = [0usize; 4];
        for _ in 0..draws {
            let sampled = joint_spec.sample(&mut rng);
            joint[sampled[&LoopLabel::H1]][sampled[&LoopLabel::H3]] += 1;
            h1_alone[alone_spec.sample(&mut rng)[&LoopLabel::H1]] += 1;
        }

        let expected_pair = draws as f64 / 9.0;
        for h1 in 1..=3 {
            for h3 in 1..=3 {
                let count = joint[h1][h3] as f64;
                assert!(
                    (count - expected_pair).abs() < expected_pair * 0.15,
                    "pair ({h1}, {h3}) drawn {count} times"
                );
            }
        }

        let expected_marginal = draws as f64 / 3.0;
        for h1 in 1..=3 {
            let with_h3: usize = joint[h1].iter().sum();
            for count in [with_h3, h1_alone[h1]] {
                assert!((count as f64 - expected_marginal).abs() < expected_marginal * 0.1);
            }
        }
    }

    #[test]
    fn sample_excludes_kept_and_absent_loops() {
        let spec = LoopSpec::parse("H1,H3:8").unwrap();
        let sampled = spec.sample(&mut StdRng::seed_from_u64(1));
        assert_eq!(sampled.len(), 1);
        assert_eq!(sampled[&LoopLabel::H3], 8);
    }

    #[test]
    fn sample_is_reproducible_for_a_seed() {
        let spec = LoopSpec::parse("H1:5-9,H2:3-12,L3:1-20").unwrap();
        let a = spec.sample(&mut StdRng::seed_from_u64(99));
        let b = spec.sample(&mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn validate_against_checks_light_chain_and_kept_loops() {
        let framework = sample_record();
        assert!(LoopSpec::parse("H3,L1:5").unwrap().validate_against(&framework).is_ok());
        assert_eq!(
            LoopSpec::parse("H1").unwrap().validate_against(&framework),
            Err(LoopSpecError::MissingLoop(LoopLabel::H1))
        );

        let nanobody =
            StructureRecord::new("nb", vec![chain(ChainRole::Heavy, 5, 0.0)], BTreeMap::new())
                .unwrap();
        assert_eq!(
            LoopSpec::parse("L2:4").unwrap().validate_against(&nanobody),
            Err(LoopSpecError::NoLightChain(LoopLabel::L2))
        );
    }

    #[test]
    fn serde_uses_the_expression_string() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            loops: LoopSpec,
        }
        let parsed: Wrapper = toml::from_str("loops = \"H3:5-13,L1\"").unwrap();
        assert_eq!(parsed.loops.labels().len(), 2);
        let text = toml::to_string(&parsed).unwrap();
        assert_eq!(text.trim(), "loops = \"H3:5-13,L1\"");
        assert!(toml::from_str::<Wrapper>("loops = \"Q1\"").is_err());
    }
}
