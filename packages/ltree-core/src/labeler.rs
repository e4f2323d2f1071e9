//! Order-preserving sibling labels.
//!
//! Sibling order is the bytewise order of their labels, so new siblings need labels that sort
//! between their neighbours. [`PaddedCodec`] maps integers to fixed-width labels whose byte
//! order equals numeric order; [`Labeler`] allocates between neighbours with a reserved gap and
//! spreads a whole sibling set evenly when no gap is left.

use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::label::{is_label_byte, Label, LABEL_ALPHABET, MAX_LABEL_LEN};
use crate::path::Path;

/// Fixed-width positional encoding of integers over a sorted alphabet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaddedCodec {
    alphabet: Vec<u8>,
    width: usize,
    max: u64,
}

impl PaddedCodec {
    pub fn new(alphabet: &str, width: usize) -> Result<Self> {
        let bytes = alphabet.as_bytes().to_vec();
        if bytes.len() < 2 {
            return Err(Error::Config("alphabet needs at least two characters".into()));
        }
        if !bytes.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::Config(format!(
                "alphabet '{alphabet}' must be strictly increasing"
            )));
        }
        if !bytes.iter().all(|b| is_label_byte(*b)) {
            return Err(Error::Config(format!(
                "alphabet '{alphabet}' has characters labels cannot hold"
            )));
        }
        if width == 0 || width > MAX_LABEL_LEN {
            return Err(Error::Config(format!("label width {width} out of range")));
        }
        let max = u32::try_from(width)
            .ok()
            .and_then(|w| (bytes.len() as u64).checked_pow(w))
            .ok_or_else(|| {
                Error::Config(format!(
                    "{width} digits of base {} overflow 64 bits",
                    bytes.len()
                ))
            })?
            - 1;
        Ok(Self {
            alphabet: bytes,
            width,
            max,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn base(&self) -> u64 {
        self.alphabet.len() as u64
    }

    /// Largest value representable in `width` digits.
    pub fn max_value(&self) -> u64 {
        self.max
    }

    pub fn encode(&self, value: u64) -> Result<Label> {
        if value > self.max {
            return Err(Error::InvalidLabelSyntax(format!(
                "{value} does not fit in {} digits",
                self.width
            )));
        }
        let mut digits = vec![self.alphabet[0]; self.width];
        let mut rest = value;
        for slot in digits.iter_mut().rev() {
            *slot = self.alphabet[(rest % self.base()) as usize];
            rest /= self.base();
        }
        Label::new(String::from_utf8_lossy(&digits).into_owned())
    }

    /// Inverse of [`encode`](Self::encode); `None` for labels the codec did not produce.
    pub fn decode(&self, label: &Label) -> Option<u64> {
        let bytes = label.as_str().as_bytes();
        if bytes.len() != self.width {
            return None;
        }
        bytes.iter().try_fold(0u64, |acc, b| {
            let digit = self.alphabet.binary_search(b).ok()? as u64;
            Some(acc * self.base() + digit)
        })
    }

    pub fn encode_path(&self, values: &[u64]) -> Result<Path> {
        let labels = values
            .iter()
            .map(|v| self.encode(*v).map(Label::into_string))
            .collect::<Result<Vec<_>>>()?;
        Path::from_labels(labels)
    }

    pub fn decode_path(&self, path: &Path) -> Option<Vec<u64>> {
        path.labels().iter().map(|l| self.decode(l)).collect()
    }

    /// Value of the first `width` characters, right-padded with the lowest digit, plus the
    /// label length. Characters outside the alphabet take their insertion rank.
    fn leading_value(&self, label: &Label) -> (u64, usize) {
        let bytes = label.as_str().as_bytes();
        let value = (0..self.width).fold(0u64, |acc, i| {
            let digit = match bytes.get(i) {
                Some(b) => self.alphabet.binary_search(b).unwrap_or_else(|at| at),
                None => 0,
            };
            acc * self.base() + digit as u64
        });
        (value, bytes.len())
    }
}

/// Allocates sibling labels from a [`PaddedCodec`] over the full label alphabet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Labeler {
    codec: PaddedCodec,
    gap: u64,
}

impl Default for Labeler {
    fn default() -> Self {
        let config = TreeConfig::default();
        let alphabet = LABEL_ALPHABET.as_bytes().to_vec();
        let max = (alphabet.len() as u64).pow(config.label_width as u32) - 1;
        Self {
            codec: PaddedCodec {
                alphabet,
                width: config.label_width,
                max,
            },
            gap: config.gap,
        }
    }
}

impl Labeler {
    pub fn new(config: &TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            codec: PaddedCodec::new(LABEL_ALPHABET, config.label_width)?,
            gap: config.gap,
        })
    }

    pub fn codec(&self) -> &PaddedCodec {
        &self.codec
    }

    pub fn gap(&self) -> u64 {
        self.gap
    }

    /// A label sorting strictly between `left` and `right` (either may be open), or `None`
    /// when the two are too close.
    ///
    /// Appends and prepends step one gap away from the neighbour; inserts between two
    /// neighbours take the midpoint.
    pub fn between(&self, left: Option<&Label>, right: Option<&Label>) -> Option<Label> {
        let width = self.codec.width;
        let lo = match left {
            None => 0,
            Some(label) => {
                let (value, len) = self.codec.leading_value(label);
                if len < width {
                    value
                } else {
                    value.checked_add(1)?
                }
            }
        };
        let hi = match right {
            None => self.codec.max,
            Some(label) => {
                let (value, len) = self.codec.leading_value(label);
                if len > width {
                    value
                } else {
                    value.checked_sub(1)?
                }
            }
        };
        if lo > hi {
            return None;
        }
        let span = hi - lo;
        let step = (self.gap - 1).min(span / 2);
        let value = match (left, right) {
            (Some(_), None) => lo + step,
            (None, Some(_)) => hi - step,
            _ => lo + span / 2,
        };
        self.codec.encode(value).ok()
    }

    /// `count` increasing labels spaced evenly over the whole label space.
    pub fn spread(&self, count: usize) -> Result<Vec<Label>> {
        let slots = count as u64 + 1;
        let step = self.codec.max / slots;
        if step == 0 {
            return Err(Error::PositionConflict(format!(
                "no room for {count} siblings in {} digits",
                self.codec.width
            )));
        }
        (1..=count as u64)
            .map(|i| self.codec.encode(i * step))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(text: &str) -> Label {
        Label::new(text).unwrap()
    }

    #[test]
    fn codec_preserves_order() {
        let codec = PaddedCodec::new(LABEL_ALPHABET, 3).unwrap();
        let values = [0u64, 1, 63, 64, 4095, 4096, 100_000, codec.max_value()];
        let labels: Vec<Label> = values.iter().map(|v| codec.encode(*v).unwrap()).collect();
        assert!(labels.windows(2).all(|w| w[0] < w[1]));
        for (v, l) in values.iter().zip(&labels) {
            assert_eq!(l.len(), 3);
            assert_eq!(codec.decode(l), Some(*v));
        }
        assert_eq!(codec.encode(0).unwrap().as_str(), "000");
        assert!(codec.encode(codec.max_value() + 1).is_err());
        assert_eq!(codec.decode(&label("00")), None);
    }

    #[test]
    fn codec_rejects_bad_alphabets() {
        assert!(matches!(PaddedCodec::new("a", 3), Err(Error::Config(_))));
        assert!(matches!(PaddedCodec::new("ba", 3), Err(Error::Config(_))));
        assert!(matches!(PaddedCodec::new("aab", 3), Err(Error::Config(_))));
        assert!(matches!(PaddedCodec::new("-a", 3), Err(Error::Config(_))));
        assert!(matches!(PaddedCodec::new(LABEL_ALPHABET, 11), Err(Error::Config(_))));
        assert!(PaddedCodec::new(LABEL_ALPHABET, 10).is_ok());
        assert!(PaddedCodec::new("0123456789", 19).is_ok());
    }

    #[test]
    fn integer_paths() {
        let codec = PaddedCodec::new("0123456789", 4).unwrap();
        let path = codec.encode_path(&[1, 20, 300]).unwrap();
        assert_eq!(path.to_string(), "0001.0020.0300");
        assert_eq!(codec.decode_path(&path), Some(vec![1, 20, 300]));
        assert_eq!(codec.decode_path(&Path::parse("0001.x").unwrap()), None);
    }

    #[test]
    fn between_respects_neighbours() {
        let labeler = Labeler::default();
        let first = labeler.between(None, None).unwrap();
        let after = labeler.between(Some(&first), None).unwrap();
        let before = labeler.between(None, Some(&first)).unwrap();
        let mid = labeler.between(Some(&before), Some(&first)).unwrap();
        assert!(before < mid && mid < first && first < after);

        let codec = labeler.codec();
        assert_eq!(
            codec.decode(&after).unwrap() - codec.decode(&first).unwrap(),
            labeler.gap()
        );
    }

    #[test]
    fn between_handles_arbitrary_labels() {
        let labeler = Labeler::default();
        let science = label("Science");
        let hobbies = label("Hobbies");
        let first = labeler.between(None, Some(&hobbies)).unwrap();
        assert!(first < hobbies);
        let inside = labeler.between(Some(&hobbies), Some(&science)).unwrap();
        assert!(hobbies < inside && inside < science);
        let short = label("A");
        let next = labeler.between(Some(&short), None).unwrap();
        assert!(next > short);
        let tail = labeler.between(Some(&label("zzzzz")), None);
        assert!(tail.is_none());
        assert!(labeler.between(None, Some(&label("0"))).is_none());
    }

    #[test]
    fn between_exhausts_adjacent_values() {
        let labeler = Labeler::default();
        let codec = labeler.codec();
        let a = codec.encode(10).unwrap();
        let b = codec.encode(11).unwrap();
        assert!(labeler.between(Some(&a), Some(&b)).is_none());
        let c = codec.encode(12).unwrap();
        assert_eq!(labeler.between(Some(&a), Some(&c)), Some(b));
    }

    #[test]
    fn spread_is_increasing() {
        let labeler = Labeler::default();
        let labels = labeler.spread(10).unwrap();
        assert_eq!(labels.len(), 10);
        assert!(labels.windows(2).all(|w| w[0] < w[1]));
        assert!(labeler.spread(0).unwrap().is_empty());
    }
}
