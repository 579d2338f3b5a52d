//! Internal keys: user keys tagged with a sequence number and value type.
//!
//! ```text
//! +----------------------------+--------------------------------+
//! | user key (var-len)         | tag = sequence << 8 | type     |
//! +----------------------------+--------------------------------+
//!                               \------------ u64 LE -----------/
//! ```
//!
//! Entries with the same user key sort by descending sequence then
//! descending type, so a forward scan visits the freshest version first.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::coding::{decode_fixed64, encode_fixed64};
use crate::comparator::Comparator;

pub type SequenceNumber = u64;

/// Sequence numbers occupy 56 bits; the low 8 bits of the tag hold the
/// value type. Sequence 0 is reserved.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
}

impl ValueType {
    pub(crate) fn from_u8(byte: u8) -> Option<ValueType> {
        match byte {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }
}

/// Type used when constructing seek targets. `Value` sorts before
/// `Deletion` at the same sequence, so a target tagged this way positions
/// at the newest entry for (user key, sequence).
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

#[inline]
pub fn pack_sequence_and_type(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    (sequence << 8) | value_type as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

pub fn append_internal_key(dst: &mut Vec<u8>, key: &ParsedInternalKey) {
    dst.extend_from_slice(key.user_key);
    encode_fixed64(dst, pack_sequence_and_type(key.sequence, key.value_type));
}

/// Split an encoded internal key into its parts.
///
/// Returns `None` when the input is shorter than the 8-byte tag or the
/// type byte is unknown.
pub fn parse_internal_key(internal_key: &[u8]) -> Option<ParsedInternalKey<'_>> {
    if internal_key.len() < 8 {
        return None;
    }
    let tag = decode_fixed64(&internal_key[internal_key.len() - 8..]);
    let value_type = ValueType::from_u8((tag & 0xff) as u8)?;
    Some(ParsedInternalKey {
        user_key: &internal_key[..internal_key.len() - 8],
        sequence: tag >> 8,
        value_type,
    })
}

#[inline]
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    debug_assert!(internal_key.len() >= 8);
    &internal_key[..internal_key.len() - 8]
}

/// Owned encoded internal key.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> InternalKey {
        let mut rep = Vec::with_capacity(user_key.len() + 8);
        append_internal_key(
            &mut rep,
            &ParsedInternalKey {
                user_key,
                sequence,
                value_type,
            },
        );
        InternalKey { rep }
    }

    pub fn decode_from(encoded: &[u8]) -> InternalKey {
        debug_assert!(encoded.len() >= 8);
        InternalKey {
            rep: encoded.to_vec(),
        }
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }

    pub fn encode(&self) -> &[u8] {
        &self.rep
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match parse_internal_key(&self.rep) {
            Some(parsed) => write!(
                f,
                "'{}' @ {} : {:?}",
                String::from_utf8_lossy(parsed.user_key),
                parsed.sequence,
                parsed.value_type
            ),
            None => write!(f, "(bad){:?}", self.rep),
        }
    }
}

/// Orders internal keys by (user key ASC, sequence DESC, type DESC).
#[derive(Clone)]
pub struct InternalKeyComparator {
    user_comparator: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    pub fn new(user_comparator: Arc<dyn Comparator>) -> InternalKeyComparator {
        InternalKeyComparator { user_comparator }
    }

    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user_comparator
    }
}

impl Comparator for InternalKeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self
            .user_comparator
            .compare(extract_user_key(a), extract_user_key(b))
        {
            Ordering::Equal => {
                let tag_a = decode_fixed64(&a[a.len() - 8..]);
                let tag_b = decode_fixed64(&b[b.len() - 8..]);
                // Higher tag (newer entry) sorts first.
                tag_b.cmp(&tag_a)
            }
            ord => ord,
        }
    }

    fn name(&self) -> &'static str {
        "lsmlite.InternalKeyComparator"
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let user_start = extract_user_key(start);
        let user_limit = extract_user_key(limit);
        let mut shortened = user_start.to_vec();
        self.user_comparator
            .find_shortest_separator(&mut shortened, user_limit);
        if shortened.len() < user_start.len()
            && self.user_comparator.compare(user_start, &shortened) == Ordering::Less
        {
            // The user key grew logically but shrank physically; tag it
            // with the maximum sequence so it sorts before every real
            // entry for that user key.
            encode_fixed64(
                &mut shortened,
                pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK),
            );
            debug_assert_eq!(self.compare(start, &shortened), Ordering::Less);
            debug_assert_eq!(self.compare(&shortened, limit), Ordering::Less);
            *start = shortened;
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        let user_key = extract_user_key(key);
        let mut shortened = user_key.to_vec();
        self.user_comparator.find_short_successor(&mut shortened);
        if shortened.len() < user_key.len()
            && self.user_comparator.compare(user_key, &shortened) == Ordering::Less
        {
            encode_fixed64(
                &mut shortened,
                pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK),
            );
            debug_assert_eq!(self.compare(key, &shortened), Ordering::Less);
            *key = shortened;
        }
    }
}

/// Seek target for memory table point lookups: the user key tagged with
/// the snapshot sequence and [`VALUE_TYPE_FOR_SEEK`]. The first entry at
/// or after it is the newest version visible at that sequence.
pub struct LookupKey {
    data: Vec<u8>,
}

impl LookupKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber) -> LookupKey {
        let mut data = Vec::with_capacity(user_key.len() + 8);
        data.extend_from_slice(user_key);
        encode_fixed64(
            &mut data,
            pack_sequence_and_type(sequence, VALUE_TYPE_FOR_SEEK),
        );
        LookupKey { data }
    }

    /// user_key ++ tag
    pub fn internal_key(&self) -> &[u8] {
        &self.data
    }

    pub fn user_key(&self) -> &[u8] {
        &self.data[..self.data.len() - 8]
    }
}
