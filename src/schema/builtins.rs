//! XML Schema 1.0 built-in datatypes.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::LazyLock;

static NAME: LazyLock<Regex> = LazyLock::new(|| regex(r"^[\p{L}_:][\p{L}\p{N}\p{M}._:\-]*$"));
static NCNAME: LazyLock<Regex> = LazyLock::new(|| regex(r"^[\p{L}_][\p{L}\p{N}\p{M}._\-]*$"));
static NMTOKEN: LazyLock<Regex> = LazyLock::new(|| regex(r"^[\p{L}\p{N}\p{M}._:\-]+$"));
static LANGUAGE: LazyLock<Regex> = LazyLock::new(|| regex(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$"));
static INTEGER: LazyLock<Regex> = LazyLock::new(|| regex(r"^[+-]?[0-9]+$"));
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| regex(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$"));
static FLOAT: LazyLock<Regex> =
    LazyLock::new(|| regex(r"^([+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?|-?INF|NaN)$"));
static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"^-?P([0-9]+Y)?([0-9]+M)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?$")
});
static TIMEZONE: LazyLock<Regex> = LazyLock::new(|| regex(r"(Z|[+-]((0[0-9]|1[0-3]):[0-5][0-9]|14:00))$"));
static DATE: LazyLock<Regex> = LazyLock::new(|| regex(r"^(-?[0-9]{4,})-([0-9]{2})-([0-9]{2})$"));
static TIME: LazyLock<Regex> = LazyLock::new(|| regex(r"^([0-9]{2}):([0-9]{2}):([0-9]{2})(\.[0-9]+)?$"));
static G_YEAR: LazyLock<Regex> = LazyLock::new(|| regex(r"^-?[0-9]{4,}$"));
static G_YEAR_MONTH: LazyLock<Regex> = LazyLock::new(|| regex(r"^-?[0-9]{4,}-(0[1-9]|1[0-2])$"));
static G_MONTH: LazyLock<Regex> = LazyLock::new(|| regex(r"^--(0[1-9]|1[0-2])$"));
static G_MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| regex(r"^--(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])$"));
static G_DAY: LazyLock<Regex> = LazyLock::new(|| regex(r"^---(0[1-9]|[12][0-9]|3[01])$"));
static HEX_BINARY: LazyLock<Regex> = LazyLock::new(|| regex(r"^([0-9a-fA-F]{2})*$"));
static BASE64: LazyLock<Regex> = LazyLock::new(|| regex(r"^([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$"));

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in datatype pattern compiles")
}

/// Whitespace handling of a datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    /// Apply this whitespace rule to a raw value.
    pub fn apply<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        match self {
            WhiteSpace::Preserve => Cow::Borrowed(raw),
            WhiteSpace::Replace => {
                if raw.contains(is_xml_space_not_blank) {
                    Cow::Owned(raw.replace(is_xml_space_not_blank, " "))
                } else {
                    Cow::Borrowed(raw)
                }
            }
            WhiteSpace::Collapse => {
                let collapsed = raw
                    .split(is_xml_space)
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                if collapsed == raw {
                    Cow::Borrowed(raw)
                } else {
                    Cow::Owned(collapsed)
                }
            }
        }
    }
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn is_xml_space_not_blank(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
}

/// How values of a type are ordered for range facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordered {
    Numeric,
    Temporal,
    Unordered,
}

/// The built-in datatypes of XML Schema 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    AnyType,
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    QName,
    Notation,
    AnyUri,
    Boolean,
    Decimal,
    Integer,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    PositiveInteger,
    NonPositiveInteger,
    NegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Float,
    Double,
    Duration,
    DateTime,
    Date,
    Time,
    GYear,
    GYearMonth,
    GMonth,
    GMonthDay,
    GDay,
    HexBinary,
    Base64Binary,
}

const ALL: &[BuiltinType] = &[
    BuiltinType::AnyType,
    BuiltinType::AnySimpleType,
    BuiltinType::String,
    BuiltinType::NormalizedString,
    BuiltinType::Token,
    BuiltinType::Language,
    BuiltinType::Name,
    BuiltinType::NCName,
    BuiltinType::Id,
    BuiltinType::IdRef,
    BuiltinType::IdRefs,
    BuiltinType::Entity,
    BuiltinType::Entities,
    BuiltinType::NmToken,
    BuiltinType::NmTokens,
    BuiltinType::QName,
    BuiltinType::Notation,
    BuiltinType::AnyUri,
    BuiltinType::Boolean,
    BuiltinType::Decimal,
    BuiltinType::Integer,
    BuiltinType::Long,
    BuiltinType::Int,
    BuiltinType::Short,
    BuiltinType::Byte,
    BuiltinType::NonNegativeInteger,
    BuiltinType::PositiveInteger,
    BuiltinType::NonPositiveInteger,
    BuiltinType::NegativeInteger,
    BuiltinType::UnsignedLong,
    BuiltinType::UnsignedInt,
    BuiltinType::UnsignedShort,
    BuiltinType::UnsignedByte,
    BuiltinType::Float,
    BuiltinType::Double,
    BuiltinType::Duration,
    BuiltinType::DateTime,
    BuiltinType::Date,
    BuiltinType::Time,
    BuiltinType::GYear,
    BuiltinType::GYearMonth,
    BuiltinType::GMonth,
    BuiltinType::GMonthDay,
    BuiltinType::GDay,
    BuiltinType::HexBinary,
    BuiltinType::Base64Binary,
];

impl BuiltinType {
    /// Look up a built-in type by its local name in the XML Schema namespace.
    pub fn from_name(local_name: &str) -> Option<Self> {
        ALL.iter().copied().find(|t| t.name() == local_name)
    }

    /// Local name in the XML Schema namespace.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnyType => "anyType",
            Self::AnySimpleType => "anySimpleType",
            Self::String => "string",
            Self::NormalizedString => "normalizedString",
            Self::Token => "token",
            Self::Language => "language",
            Self::Name => "Name",
            Self::NCName => "NCName",
            Self::Id => "ID",
            Self::IdRef => "IDREF",
            Self::IdRefs => "IDREFS",
            Self::Entity => "ENTITY",
            Self::Entities => "ENTITIES",
            Self::NmToken => "NMTOKEN",
            Self::NmTokens => "NMTOKENS",
            Self::QName => "QName",
            Self::Notation => "NOTATION",
            Self::AnyUri => "anyURI",
            Self::Boolean => "boolean",
            Self::Decimal => "decimal",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Int => "int",
            Self::Short => "short",
            Self::Byte => "byte",
            Self::NonNegativeInteger => "nonNegativeInteger",
            Self::PositiveInteger => "positiveInteger",
            Self::NonPositiveInteger => "nonPositiveInteger",
            Self::NegativeInteger => "negativeInteger",
            Self::UnsignedLong => "unsignedLong",
            Self::UnsignedInt => "unsignedInt",
            Self::UnsignedShort => "unsignedShort",
            Self::UnsignedByte => "unsignedByte",
            Self::Float => "float",
            Self::Double => "double",
            Self::Duration => "duration",
            Self::DateTime => "dateTime",
            Self::Date => "date",
            Self::Time => "time",
            Self::GYear => "gYear",
            Self::GYearMonth => "gYearMonth",
            Self::GMonth => "gMonth",
            Self::GMonthDay => "gMonthDay",
            Self::GDay => "gDay",
            Self::HexBinary => "hexBinary",
            Self::Base64Binary => "base64Binary",
        }
    }

    pub fn whitespace(&self) -> WhiteSpace {
        match self {
            Self::AnyType | Self::AnySimpleType | Self::String => WhiteSpace::Preserve,
            Self::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Whether values are whitespace-separated lists.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::IdRefs | Self::Entities | Self::NmTokens)
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::AnyType)
    }

    pub fn ordering(&self) -> Ordered {
        match self {
            Self::Decimal
            | Self::Integer
            | Self::Long
            | Self::Int
            | Self::Short
            | Self::Byte
            | Self::NonNegativeInteger
            | Self::PositiveInteger
            | Self::NonPositiveInteger
            | Self::NegativeInteger
            | Self::UnsignedLong
            | Self::UnsignedInt
            | Self::UnsignedShort
            | Self::UnsignedByte
            | Self::Float
            | Self::Double => Ordered::Numeric,
            Self::DateTime
            | Self::Date
            | Self::Time
            | Self::GYear
            | Self::GYearMonth
            | Self::GMonth
            | Self::GMonthDay
            | Self::GDay => Ordered::Temporal,
            _ => Ordered::Unordered,
        }
    }

    /// Check a whitespace-normalized value against the lexical space.
    ///
    /// The error is a phrase completing "value '...' is ...".
    pub fn check(&self, value: &str) -> Result<(), String> {
        let valid = match self {
            Self::AnyType
            | Self::AnySimpleType
            | Self::String
            | Self::NormalizedString
            | Self::Token
            | Self::AnyUri => true,
            Self::Language => LANGUAGE.is_match(value),
            Self::Name => NAME.is_match(value),
            Self::NCName | Self::Id | Self::IdRef | Self::Entity => NCNAME.is_match(value),
            Self::NmToken => NMTOKEN.is_match(value),
            Self::IdRefs | Self::Entities => list_of(value, &NCNAME),
            Self::NmTokens => list_of(value, &NMTOKEN),
            Self::QName | Self::Notation => match value.split_once(':') {
                Some((prefix, local)) => NCNAME.is_match(prefix) && NCNAME.is_match(local),
                None => NCNAME.is_match(value),
            },
            Self::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Self::Decimal => DECIMAL.is_match(value),
            Self::Float | Self::Double => FLOAT.is_match(value),
            Self::Integer
            | Self::Long
            | Self::Int
            | Self::Short
            | Self::Byte
            | Self::NonNegativeInteger
            | Self::PositiveInteger
            | Self::NonPositiveInteger
            | Self::NegativeInteger
            | Self::UnsignedLong
            | Self::UnsignedInt
            | Self::UnsignedShort
            | Self::UnsignedByte => {
                if !INTEGER.is_match(value) {
                    false
                } else if !self.integer_in_range(value) {
                    return Err(format!("out of range for xs:{}", self.name()));
                } else {
                    true
                }
            }
            Self::Duration => {
                DURATION.is_match(value)
                    && value.bytes().any(|b| b.is_ascii_digit())
                    && !value.ends_with('T')
            }
            Self::DateTime => match strip_timezone(value).split_once('T') {
                Some((date, time)) => valid_date(date) && valid_time(time),
                None => false,
            },
            Self::Date => valid_date(strip_timezone(value)),
            Self::Time => valid_time(strip_timezone(value)),
            Self::GYear => G_YEAR.is_match(strip_timezone(value)),
            Self::GYearMonth => G_YEAR_MONTH.is_match(strip_timezone(value)),
            Self::GMonth => G_MONTH.is_match(strip_timezone(value)),
            Self::GMonthDay => G_MONTH_DAY.is_match(strip_timezone(value)),
            Self::GDay => G_DAY.is_match(strip_timezone(value)),
            Self::HexBinary => HEX_BINARY.is_match(value),
            Self::Base64Binary => {
                let compact: String = value.chars().filter(|c| !is_xml_space(*c)).collect();
                BASE64.is_match(&compact)
            }
        };

        if valid {
            Ok(())
        } else {
            Err(format!("not a valid xs:{}", self.name()))
        }
    }

    fn integer_in_range(&self, value: &str) -> bool {
        let (min, max): (Option<i128>, Option<i128>) = match self {
            Self::Long => (Some(i64::MIN.into()), Some(i64::MAX.into())),
            Self::Int => (Some(i32::MIN.into()), Some(i32::MAX.into())),
            Self::Short => (Some(i16::MIN.into()), Some(i16::MAX.into())),
            Self::Byte => (Some(i8::MIN.into()), Some(i8::MAX.into())),
            Self::UnsignedLong => (Some(0), Some(u64::MAX.into())),
            Self::UnsignedInt => (Some(0), Some(u32::MAX.into())),
            Self::UnsignedShort => (Some(0), Some(u16::MAX.into())),
            Self::UnsignedByte => (Some(0), Some(u8::MAX.into())),
            Self::NonNegativeInteger => (Some(0), None),
            Self::PositiveInteger => (Some(1), None),
            Self::NonPositiveInteger => (None, Some(0)),
            Self::NegativeInteger => (None, Some(-1)),
            _ => (None, None),
        };

        match value.parse::<i128>() {
            Ok(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
            Err(_) => {
                // Beyond i128: only the unbounded side of the type can hold it.
                let negative = value.starts_with('-');
                if negative {
                    min.is_none()
                } else {
                    max.is_none()
                }
            }
        }
    }

    /// Length of a normalized value as the length facets count it.
    pub fn value_length(&self, value: &str) -> usize {
        match self {
            Self::HexBinary => value.len() / 2,
            Self::Base64Binary => {
                let compact: Vec<u8> = value.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
                let padding = compact.iter().rev().take_while(|b| **b == b'=').count();
                ((compact.len() / 4) * 3).saturating_sub(padding.min(2))
            }
            _ if self.is_list() => value.split(is_xml_space).filter(|s| !s.is_empty()).count(),
            _ => value.chars().count(),
        }
    }

    /// Order two normalized values for range facets.
    pub fn compare(&self, left: &str, right: &str) -> Option<Ordering> {
        match self.ordering() {
            Ordered::Numeric => {
                let l = parse_number(left)?;
                let r = parse_number(right)?;
                l.partial_cmp(&r)
            }
            Ordered::Temporal => {
                let l = strip_timezone(left);
                let r = strip_timezone(right);
                if l.len() == r.len() {
                    Some(l.cmp(r))
                } else {
                    None
                }
            }
            Ordered::Unordered => None,
        }
    }
}

fn list_of(value: &str, item: &Regex) -> bool {
    let mut items = value.split(is_xml_space).filter(|s| !s.is_empty()).peekable();
    items.peek().is_some() && items.all(|i| item.is_match(i))
}

fn parse_number(value: &str) -> Option<f64> {
    match value {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        _ => value.parse::<f64>().ok().filter(|n| !n.is_nan()),
    }
}

fn strip_timezone(value: &str) -> &str {
    match TIMEZONE.find(value) {
        Some(m) => &value[..m.start()],
        None => value,
    }
}

fn valid_date(value: &str) -> bool {
    let Some(caps) = DATE.captures(value) else {
        return false;
    };
    let (Ok(year), Ok(month), Ok(day)) = (caps[1].parse::<i32>(), caps[2].parse::<u32>(), caps[3].parse::<u32>())
    else {
        return false;
    };
    year != 0 && NaiveDate::from_ymd_opt(year, month, day).is_some()
}

fn valid_time(value: &str) -> bool {
    let Some(caps) = TIME.captures(value) else {
        return false;
    };
    let (Ok(hour), Ok(minute), Ok(second)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>(), caps[3].parse::<u32>())
    else {
        return false;
    };
    let end_of_day = hour == 24 && minute == 0 && second == 0 && caps.get(4).map_or(true, |f| f.as_str().trim_end_matches('0') == ".");
    end_of_day || NaiveTime::from_hms_opt(hour, minute, second).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(BuiltinType::from_name("int"), Some(BuiltinType::Int));
        assert_eq!(BuiltinType::from_name("NCName"), Some(BuiltinType::NCName));
        assert_eq!(BuiltinType::from_name("Int"), None);
    }

    #[test]
    fn test_integer_family() {
        assert!(BuiltinType::Int.check("42").is_ok());
        assert!(BuiltinType::Int.check("-2147483648").is_ok());
        assert!(BuiltinType::Int.check("abc").unwrap_err().contains("not a valid xs:int"));
        assert!(BuiltinType::Int.check("2147483648").unwrap_err().contains("out of range"));
        assert!(BuiltinType::Int.check("4.2").is_err());
        assert!(BuiltinType::UnsignedByte.check("255").is_ok());
        assert!(BuiltinType::UnsignedByte.check("-1").is_err());
        assert!(BuiltinType::PositiveInteger.check("0").is_err());
        assert!(BuiltinType::Integer.check("123456789012345678901234567890123456789012").is_ok());
        assert!(BuiltinType::NegativeInteger.check("99999999999999999999999999999999999999999").is_err());
    }

    #[test]
    fn test_decimal_and_float() {
        assert!(BuiltinType::Decimal.check("-1.50").is_ok());
        assert!(BuiltinType::Decimal.check(".5").is_ok());
        assert!(BuiltinType::Decimal.check("1e3").is_err());
        assert!(BuiltinType::Double.check("1e3").is_ok());
        assert!(BuiltinType::Double.check("-INF").is_ok());
        assert!(BuiltinType::Float.check("NaN").is_ok());
        assert!(BuiltinType::Float.check("one").is_err());
    }

    #[test]
    fn test_boolean() {
        for ok in ["true", "false", "1", "0"] {
            assert!(BuiltinType::Boolean.check(ok).is_ok());
        }
        assert!(BuiltinType::Boolean.check("TRUE").is_err());
    }

    #[test]
    fn test_temporal_types() {
        assert!(BuiltinType::Date.check("2024-02-29").is_ok());
        assert!(BuiltinType::Date.check("2023-02-29").is_err());
        assert!(BuiltinType::Date.check("2024-01-01Z").is_ok());
        assert!(BuiltinType::Date.check("2024-01-01+05:30").is_ok());
        assert!(BuiltinType::DateTime.check("2024-01-01T10:20:30.125Z").is_ok());
        assert!(BuiltinType::DateTime.check("2024-01-01 10:20:30").is_err());
        assert!(BuiltinType::Time.check("23:59:59").is_ok());
        assert!(BuiltinType::Time.check("25:00:00").is_err());
        assert!(BuiltinType::Duration.check("P1Y2M3DT4H5M6.5S").is_ok());
        assert!(BuiltinType::Duration.check("P").is_err());
        assert!(BuiltinType::Duration.check("P1DT").is_err());
        assert!(BuiltinType::GYearMonth.check("2024-13").is_err());
        assert!(BuiltinType::GMonthDay.check("--12-25").is_ok());
        assert!(BuiltinType::GDay.check("---31").is_ok());
    }

    #[test]
    fn test_name_types() {
        assert!(BuiltinType::NCName.check("order-id").is_ok());
        assert!(BuiltinType::NCName.check("ns:order").is_err());
        assert!(BuiltinType::QName.check("ns:order").is_ok());
        assert!(BuiltinType::Language.check("en-US").is_ok());
        assert!(BuiltinType::NmTokens.check("a b c").is_ok());
        assert!(BuiltinType::NmTokens.check("").is_err());
    }

    #[test]
    fn test_binary_types() {
        assert!(BuiltinType::HexBinary.check("0FB7").is_ok());
        assert!(BuiltinType::HexBinary.check("0FB").is_err());
        assert!(BuiltinType::Base64Binary.check("aGVsbG8=").is_ok());
        assert!(BuiltinType::Base64Binary.check("aGVsbG8").is_err());
        assert_eq!(BuiltinType::HexBinary.value_length("0FB7"), 2);
        assert_eq!(BuiltinType::Base64Binary.value_length("aGVsbG8="), 5);
    }

    #[test]
    fn test_whitespace_rules() {
        assert_eq!(WhiteSpace::Collapse.apply("  a \n b  "), "a b");
        assert_eq!(WhiteSpace::Replace.apply("a\tb"), "a b");
        assert_eq!(WhiteSpace::Preserve.apply(" a "), " a ");
    }

    #[test]
    fn test_compare() {
        assert_eq!(BuiltinType::Int.compare("9", "10"), Some(Ordering::Less));
        assert_eq!(BuiltinType::Date.compare("2024-01-02", "2024-01-01"), Some(Ordering::Greater));
        assert_eq!(BuiltinType::String.compare("a", "b"), None);
    }
}
