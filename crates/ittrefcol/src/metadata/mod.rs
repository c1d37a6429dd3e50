//! Typed payload rendering for metadata, histogram and counter calls.
//!
//! A C caller hands over a type tag plus an untyped pointer. The tag is
//! decoded once into [`MetadataType`], the pointer is viewed as the matching
//! slice in [`MetadataValues`], and a single `Display` impl renders any of
//! them as `v;v;v;`.

use std::ffi::{CStr, c_void};
use std::fmt;
use std::marker::PhantomData;

use ittrefcol_abi::*;

use crate::error::CollectorError;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataType {
    U64,
    S64,
    U32,
    S32,
    U16,
    S16,
    Float,
    Double,
}

impl MetadataType {
    pub fn raw(self) -> RawMetadataType {
        match self {
            MetadataType::U64 => METADATA_U64,
            MetadataType::S64 => METADATA_S64,
            MetadataType::U32 => METADATA_U32,
            MetadataType::S32 => METADATA_S32,
            MetadataType::U16 => METADATA_U16,
            MetadataType::S16 => METADATA_S16,
            MetadataType::Float => METADATA_FLOAT,
            MetadataType::Double => METADATA_DOUBLE,
        }
    }
}

impl TryFrom<RawMetadataType> for MetadataType {
    type Error = CollectorError;

    fn try_from(raw: RawMetadataType) -> Result<Self, Self::Error> {
        Ok(match raw {
            METADATA_U64 => MetadataType::U64,
            METADATA_S64 => MetadataType::S64,
            METADATA_U32 => MetadataType::U32,
            METADATA_S32 => MetadataType::S32,
            METADATA_U16 => MetadataType::U16,
            METADATA_S16 => MetadataType::S16,
            METADATA_FLOAT => MetadataType::Float,
            METADATA_DOUBLE => MetadataType::Double,
            other => return Err(CollectorError::UnknownMetadataType(other)),
        })
    }
}

// ── Values ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetadataValues<'a> {
    U64(&'a [u64]),
    S64(&'a [i64]),
    U32(&'a [u32]),
    S32(&'a [i32]),
    U16(&'a [u16]),
    S16(&'a [i16]),
    Float(&'a [f32]),
    Double(&'a [f64]),
}

impl MetadataValues<'_> {
    pub fn len(&self) -> usize {
        match self {
            MetadataValues::U64(v) => v.len(),
            MetadataValues::S64(v) => v.len(),
            MetadataValues::U32(v) => v.len(),
            MetadataValues::S32(v) => v.len(),
            MetadataValues::U16(v) => v.len(),
            MetadataValues::S16(v) => v.len(),
            MetadataValues::Float(v) => v.len(),
            MetadataValues::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    values.iter().try_for_each(|v| write!(f, "{v};"))
}

fn join_fixed<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    values.iter().try_for_each(|v| write!(f, "{v:.6};"))
}

impl fmt::Display for MetadataValues<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValues::U64(v) => join(f, v),
            MetadataValues::S64(v) => join(f, v),
            MetadataValues::U32(v) => join(f, v),
            MetadataValues::S32(v) => join(f, v),
            MetadataValues::U16(v) => join(f, v),
            MetadataValues::S16(v) => join(f, v),
            MetadataValues::Float(v) => join_fixed(f, v),
            MetadataValues::Double(v) => join_fixed(f, v),
        }
    }
}

/// Element types that have a metadata tag.
pub trait MetadataElement: Copy {
    const TYPE: MetadataType;
}

macro_rules! metadata_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl MetadataElement for $ty {
            const TYPE: MetadataType = MetadataType::$tag;
        })*
    };
}

metadata_element! {
    u64 => U64,
    i64 => S64,
    u32 => U32,
    i32 => S32,
    u16 => U16,
    i16 => S16,
    f32 => Float,
    f64 => Double,
}

/// An undecoded payload as it crosses the C boundary: a raw type tag, an
/// element count and a data pointer.
#[derive(Debug, Clone, Copy)]
pub struct RawValues<'a> {
    ty: RawMetadataType,
    count: usize,
    data: *const c_void,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a> RawValues<'a> {
    /// # Safety
    /// If `data` is non-null and `ty` is a known tag, `data` must point to
    /// `count` properly aligned elements of that type, valid for `'a`.
    pub unsafe fn new(ty: RawMetadataType, count: usize, data: *const c_void) -> Self {
        Self {
            ty,
            count,
            data,
            _borrow: PhantomData,
        }
    }

    pub fn from_slice<T: MetadataElement>(values: &'a [T]) -> Self {
        Self {
            ty: T::TYPE.raw(),
            count: values.len(),
            data: values.as_ptr().cast(),
            _borrow: PhantomData,
        }
    }

    pub fn raw_type(&self) -> RawMetadataType {
        self.ty
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn decode(&self) -> Result<MetadataValues<'a>, CollectorError> {
        let ty = MetadataType::try_from(self.ty)?;
        if self.data.is_null() {
            return Err(CollectorError::Missing("metadata data pointer"));
        }
        // SAFETY: the constructor contract covers `count` elements of the
        // declared type.
        unsafe {
            Ok(match ty {
                MetadataType::U64 => MetadataValues::U64(slice(self.data, self.count)),
                MetadataType::S64 => MetadataValues::S64(slice(self.data, self.count)),
                MetadataType::U32 => MetadataValues::U32(slice(self.data, self.count)),
                MetadataType::S32 => MetadataValues::S32(slice(self.data, self.count)),
                MetadataType::U16 => MetadataValues::U16(slice(self.data, self.count)),
                MetadataType::S16 => MetadataValues::S16(slice(self.data, self.count)),
                MetadataType::Float => MetadataValues::Float(slice(self.data, self.count)),
                MetadataType::Double => MetadataValues::Double(slice(self.data, self.count)),
            })
        }
    }
}

unsafe fn slice<'a, T>(data: *const c_void, count: usize) -> &'a [T] {
    unsafe { std::slice::from_raw_parts(data.cast::<T>(), count) }
}

// ── Counter context metadata ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextValue<'a> {
    Text(&'a CStr),
    Number(u64),
}

impl<'a> ContextValue<'a> {
    /// # Safety
    /// `entry.value` must point to a NUL-terminated string for the string
    /// tags and to a `u64` for the numeric ones, valid for `'a`.
    pub unsafe fn from_raw(entry: &IttContextMetadata) -> Result<Self, CollectorError> {
        if entry.value.is_null() {
            return Err(CollectorError::Missing("context metadata value"));
        }
        match entry.ty {
            CONTEXT_NAME | CONTEXT_DEVICE | CONTEXT_UNITS | CONTEXT_PCI_ADDR => {
                Ok(ContextValue::Text(unsafe { CStr::from_ptr(entry.value.cast()) }))
            }
            CONTEXT_TID
            | CONTEXT_MAX_VAL
            | CONTEXT_BANDWIDTH_FLAG
            | CONTEXT_LATENCY_FLAG
            | CONTEXT_OCCUPANCY_FLAG
            | CONTEXT_ON_THREAD_FLAG
            | CONTEXT_IS_ABS_VAL_FLAG
            | CONTEXT_CPU_INSTRUCTIONS_FLAG
            | CONTEXT_CPU_CYCLES_FLAG => {
                Ok(ContextValue::Number(unsafe { entry.value.cast::<u64>().read_unaligned() }))
            }
            other => Err(CollectorError::UnknownContextType(other)),
        }
    }
}

impl fmt::Display for ContextValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Text(s) => write!(f, "{};", s.to_string_lossy()),
            ContextValue::Number(n) => write!(f, "{n};"),
        }
    }
}

/// Renders a whole context-metadata array, stopping at the first entry
/// that cannot be decoded.
///
/// # Safety
/// Every entry must satisfy [`ContextValue::from_raw`].
pub unsafe fn render_context(entries: &[IttContextMetadata]) -> Result<String, CollectorError> {
    use std::fmt::Write;

    let mut out = String::new();
    for entry in entries {
        let value = unsafe { ContextValue::from_raw(entry) }?;
        let _ = write!(out, "{value}");
    }
    Ok(out)
}

// ── Formatted metadata ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormatArg<'a> {
    Int(i64),
    Uint(u64),
    Double(f64),
    Str(&'a str),
}

/// Renders a printf-style `format` against `args`.
///
/// Supports `%d %i %u %x %X %f %F %s %c %%` with flags, width, precision and
/// the `h`/`l`/`ll`/`z`/`j`/`t` length modifiers. A conversion with no
/// argument left, or one that is not supported, is copied through verbatim.
pub fn format_metadata(format: &str, args: &[FormatArg<'_>]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut rest = format;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(directive) = Directive::parse(rest) else {
            out.push_str(rest);
            return out;
        };
        let raw = &rest[..directive.len];
        rest = &rest[directive.len..];

        if directive.conversion == '%' {
            out.push('%');
            continue;
        }
        if !directive.is_supported() {
            out.push_str(raw);
            continue;
        }
        match args.next() {
            Some(arg) => directive.render(arg, &mut out),
            None => out.push_str(raw),
        }
    }
    out.push_str(rest);
    out
}

struct Directive {
    left: bool,
    zero: bool,
    plus: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
    len: usize,
}

impl Directive {
    /// `s` starts at a `%`.
    fn parse(s: &str) -> Option<Directive> {
        let bytes = s.as_bytes();
        let mut i = 1;
        let mut directive = Directive {
            left: false,
            zero: false,
            plus: false,
            width: 0,
            precision: None,
            conversion: '%',
            len: 0,
        };
        while let Some(&b) = bytes.get(i) {
            match b {
                b'-' => directive.left = true,
                b'0' => directive.zero = true,
                b'+' => directive.plus = true,
                b' ' | b'#' => {}
                _ => break,
            }
            i += 1;
        }
        while let Some(d) = bytes.get(i).filter(|b| b.is_ascii_digit()) {
            directive.width = directive.width * 10 + usize::from(d - b'0');
            i += 1;
        }
        if bytes.get(i) == Some(&b'.') {
            i += 1;
            let mut precision = 0;
            while let Some(d) = bytes.get(i).filter(|b| b.is_ascii_digit()) {
                precision = precision * 10 + usize::from(d - b'0');
                i += 1;
            }
            directive.precision = Some(precision);
        }
        while matches!(bytes.get(i), Some(b'h' | b'l' | b'L' | b'z' | b'j' | b't' | b'q')) {
            i += 1;
        }
        let conversion = s[i..].chars().next()?;
        directive.conversion = conversion;
        directive.len = i + conversion.len_utf8();
        Some(directive)
    }

    fn is_supported(&self) -> bool {
        matches!(self.conversion, 'd' | 'i' | 'u' | 'x' | 'X' | 'f' | 'F' | 's' | 'c')
    }

    fn render(&self, arg: &FormatArg<'_>, out: &mut String) {
        let body = match (self.conversion, arg) {
            ('d' | 'i', FormatArg::Int(v)) => signed(*v, self.plus),
            ('d' | 'i', FormatArg::Uint(v)) => signed(*v as i64, self.plus),
            ('u', FormatArg::Uint(v)) => v.to_string(),
            ('u', FormatArg::Int(v)) => (*v as u64).to_string(),
            ('x', FormatArg::Uint(v)) => format!("{v:x}"),
            ('x', FormatArg::Int(v)) => format!("{:x}", *v as u64),
            ('X', FormatArg::Uint(v)) => format!("{v:X}"),
            ('X', FormatArg::Int(v)) => format!("{:X}", *v as u64),
            ('f' | 'F', FormatArg::Double(v)) => format!("{:.*}", self.precision.unwrap_or(6), v),
            ('f' | 'F', FormatArg::Int(v)) => format!("{:.*}", self.precision.unwrap_or(6), *v as f64),
            ('f' | 'F', FormatArg::Uint(v)) => format!("{:.*}", self.precision.unwrap_or(6), *v as f64),
            ('s', FormatArg::Str(s)) => match self.precision {
                Some(p) => s.chars().take(p).collect(),
                None => (*s).to_owned(),
            },
            ('c', FormatArg::Uint(v)) => char::from_u32(*v as u32).map(String::from).unwrap_or_default(),
            ('c', FormatArg::Int(v)) => char::from_u32(*v as u32).map(String::from).unwrap_or_default(),
            (_, FormatArg::Int(v)) => v.to_string(),
            (_, FormatArg::Uint(v)) => v.to_string(),
            (_, FormatArg::Double(v)) => v.to_string(),
            (_, FormatArg::Str(s)) => (*s).to_owned(),
        };
        self.pad(body, out);
    }

    fn pad(&self, body: String, out: &mut String) {
        let len = body.chars().count();
        if len >= self.width {
            out.push_str(&body);
            return;
        }
        let fill = self.width - len;
        if self.left {
            out.push_str(&body);
            out.extend(std::iter::repeat_n(' ', fill));
        } else if self.zero && self.conversion != 's' && self.conversion != 'c' {
            let (sign, digits) = match body.strip_prefix(['-', '+']) {
                Some(digits) => (&body[..1], digits),
                None => ("", body.as_str()),
            };
            out.push_str(sign);
            out.extend(std::iter::repeat_n('0', fill));
            out.push_str(digits);
        } else {
            out.extend(std::iter::repeat_n(' ', fill));
            out.push_str(&body);
        }
    }
}

fn signed(v: i64, plus: bool) -> String {
    if plus && v >= 0 { format!("+{v}") } else { v.to_string() }
}
