//
// Typed versions of the WebDAV headers the COPY/MOVE handler needs.
//
use headers::{Header, HeaderName, HeaderValue};

lazy_static! {
    static ref DEPTH: HeaderName = HeaderName::from_static("depth");
    static ref DESTINATION: HeaderName = HeaderName::from_static("destination");
    static ref OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
}

/// Depth: 0 / 1 / infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        match value.to_str().map_err(|_| headers::Error::invalid())? {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            s if s.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let s = match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(s)));
    }
}

/// Destination: the target URL of a COPY or MOVE.
///
/// RFC 4918 requires a full URL here; some clients send an absolute path.
/// Both are kept as the raw string and interpreted by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let s = value.to_str().map_err(|_| headers::Error::invalid())?;
        if s.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(Destination(s.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

/// Overwrite: T / F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        match value.as_bytes() {
            b"T" => Ok(Overwrite(true)),
            b"F" => Ok(Overwrite(false)),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let s = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(s)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headers::HeaderMapExt;
    use http::header::HeaderMap;

    #[test]
    fn decode_depth() {
        let mut map = HeaderMap::new();
        map.insert("Depth", "infinity".parse().unwrap());
        assert_eq!(map.typed_get::<Depth>(), Some(Depth::Infinity));
        map.insert("Depth", "0".parse().unwrap());
        assert_eq!(map.typed_get::<Depth>(), Some(Depth::Zero));
        map.insert("Depth", "2".parse().unwrap());
        assert_eq!(map.typed_get::<Depth>(), None);
    }

    #[test]
    fn decode_overwrite() {
        let mut map = HeaderMap::new();
        map.insert("Overwrite", "F".parse().unwrap());
        assert_eq!(map.typed_get::<Overwrite>(), Some(Overwrite(false)));
        map.insert("Overwrite", "x".parse().unwrap());
        assert_eq!(map.typed_get::<Overwrite>(), None);
    }
}
