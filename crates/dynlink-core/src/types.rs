//! Value and metadata types shared by every dynlink crate.
//!
//! Buffers are typed (`Values`) rather than raw byte blocks, so copies
//! between caller, engine and service never need an element-size table.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Element type of a remote data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Char,
    UChar,
    Short,
    UShort,
    Long,
    ULong,
    Float,
    Double,
    Enum,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Char => "char",
            DataType::UChar => "uchar",
            DataType::Short => "short",
            DataType::UShort => "ushort",
            DataType::Long => "long",
            DataType::ULong => "ulong",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Enum => "enum",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    String(Vec<String>),
    Char(Vec<i8>),
    UChar(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Long(Vec<i32>),
    ULong(Vec<u32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Enum(Vec<u16>),
}

/// Applies the same expression to whichever vector a `Values` holds.
macro_rules! each_variant {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            Values::String($v) => $body,
            Values::Char($v) => $body,
            Values::UChar($v) => $body,
            Values::Short($v) => $body,
            Values::UShort($v) => $body,
            Values::Long($v) => $body,
            Values::ULong($v) => $body,
            Values::Float($v) => $body,
            Values::Double($v) => $body,
            Values::Enum($v) => $body,
        }
    };
}

/// Like `each_variant!`, but rewraps the result in the same variant.
macro_rules! map_variant {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            Values::String($v) => Values::String($body),
            Values::Char($v) => Values::Char($body),
            Values::UChar($v) => Values::UChar($body),
            Values::Short($v) => Values::Short($body),
            Values::UShort($v) => Values::UShort($body),
            Values::Long($v) => Values::Long($body),
            Values::ULong($v) => Values::ULong($body),
            Values::Float($v) => Values::Float($body),
            Values::Double($v) => Values::Double($body),
            Values::Enum($v) => Values::Enum($body),
        }
    };
}

impl Values {
    /// A buffer of `count` default elements.
    pub fn zeroed(data_type: DataType, count: usize) -> Self {
        match data_type {
            DataType::String => Values::String(vec![String::new(); count]),
            DataType::Char => Values::Char(vec![0; count]),
            DataType::UChar => Values::UChar(vec![0; count]),
            DataType::Short => Values::Short(vec![0; count]),
            DataType::UShort => Values::UShort(vec![0; count]),
            DataType::Long => Values::Long(vec![0; count]),
            DataType::ULong => Values::ULong(vec![0; count]),
            DataType::Float => Values::Float(vec![0.0; count]),
            DataType::Double => Values::Double(vec![0.0; count]),
            DataType::Enum => Values::Enum(vec![0; count]),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Values::String(_) => DataType::String,
            Values::Char(_) => DataType::Char,
            Values::UChar(_) => DataType::UChar,
            Values::Short(_) => DataType::Short,
            Values::UShort(_) => DataType::UShort,
            Values::Long(_) => DataType::Long,
            Values::ULong(_) => DataType::ULong,
            Values::Float(_) => DataType::Float,
            Values::Double(_) => DataType::Double,
            Values::Enum(_) => DataType::Enum,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the first `count` elements (fewer if the buffer is shorter).
    pub fn prefix(&self, count: usize) -> Values {
        map_variant!(self, v => v[..count.min(v.len())].to_vec())
    }

    /// Overwrite the leading elements of `self` with up to `count`
    /// elements of `src`. Returns the number copied; 0 on a type mismatch.
    pub fn copy_prefix_from(&mut self, src: &Values, count: usize) -> usize {
        if self.data_type() != src.data_type() {
            return 0;
        }
        match (self, src) {
            (Values::String(d), Values::String(s)) => copy_clone(d, s, count),
            (Values::Char(d), Values::Char(s)) => copy_copy(d, s, count),
            (Values::UChar(d), Values::UChar(s)) => copy_copy(d, s, count),
            (Values::Short(d), Values::Short(s)) => copy_copy(d, s, count),
            (Values::UShort(d), Values::UShort(s)) => copy_copy(d, s, count),
            (Values::Long(d), Values::Long(s)) => copy_copy(d, s, count),
            (Values::ULong(d), Values::ULong(s)) => copy_copy(d, s, count),
            (Values::Float(d), Values::Float(s)) => copy_copy(d, s, count),
            (Values::Double(d), Values::Double(s)) => copy_copy(d, s, count),
            (Values::Enum(d), Values::Enum(s)) => copy_copy(d, s, count),
            _ => 0,
        }
    }

    /// First three elements rendered for diagnostics.
    pub fn head_summary(&self) -> String {
        each_variant!(self, v => {
            let head: Vec<String> = v.iter().take(3).map(|e| format!("{:?}", e)).collect();
            format!("{}[{}]: {}...", self.data_type(), v.len(), head.join(", "))
        })
    }
}

fn copy_copy<T: Copy>(dst: &mut [T], src: &[T], count: usize) -> usize {
    let n = count.min(dst.len()).min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

fn copy_clone<T: Clone>(dst: &mut [T], src: &[T], count: usize) -> usize {
    let n = count.min(dst.len()).min(src.len());
    dst[..n].clone_from_slice(&src[..n]);
    n
}

/// A Rust element type that can be read from or written to a link.
pub trait Element: Clone + Send + 'static {
    /// True if values of this Rust type can be stored as `data_type`.
    fn matches(data_type: DataType) -> bool;

    fn slice(values: &Values) -> Option<&[Self]>;

    /// Build a buffer of `data_type` from caller data.
    fn to_values(data: &[Self], data_type: DataType) -> Option<Values>;
}

macro_rules! impl_element {
    ($t:ty, $($variant:ident),+) => {
        impl Element for $t {
            fn matches(data_type: DataType) -> bool {
                matches!(data_type, $(DataType::$variant)|+)
            }

            fn slice(values: &Values) -> Option<&[Self]> {
                match values {
                    $(Values::$variant(v) => Some(v.as_slice()),)+
                    _ => None,
                }
            }

            fn to_values(data: &[Self], data_type: DataType) -> Option<Values> {
                match data_type {
                    $(DataType::$variant => Some(Values::$variant(data.to_vec())),)+
                    _ => None,
                }
            }
        }
    };
}

impl_element!(String, String);
impl_element!(i8, Char);
impl_element!(u8, UChar);
impl_element!(i16, Short);
impl_element!(u16, UShort, Enum);
impl_element!(i32, Long);
impl_element!(u32, ULong);
impl_element!(f32, Float);
impl_element!(f64, Double);

/// Wall-clock time of the last remote update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self { secs: d.as_secs(), nanos: d.subsec_nanos() }
    }
}

/// Alarm severity reported alongside a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    Invalid,
}

/// A value update with its quality metadata, as delivered by a
/// subscription or a read-with-acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedValues {
    pub values: Values,
    pub timestamp: Timestamp,
    pub alarm_status: i16,
    pub severity: Severity,
}

impl TimedValues {
    pub fn new(values: Values) -> Self {
        Self {
            values,
            timestamp: Timestamp::now(),
            alarm_status: 0,
            severity: Severity::NoAlarm,
        }
    }
}

/// Display and control metadata fetched once per connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlInfo {
    pub graphic_low: f64,
    pub graphic_high: f64,
    pub control_low: f64,
    pub control_high: f64,
    pub precision: i16,
    pub units: String,
}

/// Which queue and worker a link belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Transport-level connectivity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    NotConnected,
}

/// Per-connection-attempt link state. Only ever advances, except that a
/// lost connection starts a new attempt at `Searching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LinkState {
    Starting = 0,
    Searching = 1,
    FetchingMetadata = 2,
    Connected = 3,
}

impl LinkState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LinkState::Starting,
            1 => LinkState::Searching,
            2 => LinkState::FetchingMetadata,
            _ => LinkState::Connected,
        }
    }
}

/// Attach-time link options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkOptions {
    /// Cap every transfer at one element, whatever the remote count.
    pub scalar: bool,
    /// Refuse to attach unless the name is served by this process.
    pub local_only: bool,
}

impl LinkOptions {
    pub const SCALAR: LinkOptions = LinkOptions { scalar: true, local_only: false };
    pub const LOCAL_ONLY: LinkOptions = LinkOptions { scalar: false, local_only: true };
}
