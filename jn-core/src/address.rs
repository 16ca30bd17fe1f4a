//! Address Parser (C1): turns a user-supplied source/sink expression into a
//! structured [`Address`]. See spec.md §4.1 and §6.1 for the grammar and
//! algorithm this module implements.

use crate::error::CoreError;

/// Compression codec inferred from a path suffix, in the application order
/// spec.md §3.1 describes: decode order when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Gzip,
    Bz2,
    Xz,
    Zstd,
}

impl Compression {
    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "gz" => Some(Self::Gzip),
            "bz2" => Some(Self::Bz2),
            "xz" => Some(Self::Xz),
            "zst" => Some(Self::Zstd),
            _ => None,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Bz2 => "bz2",
            Self::Xz => "xz",
            Self::Zstd => "zst",
        }
    }

    /// Token used to match a compression plugin's `matches` pattern
    /// (spec.md §4.5 step 2).
    pub fn token(self) -> &'static str {
        self.suffix()
    }
}

/// Relational operator suffix on a query key (`role>=`, `size!=`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Ne => "!=",
        }
    }
}

/// A single `key[op]=value` pair from an address's query string. Order is
/// preserved and keys may repeat — both are significant for filter-building
/// (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub op: Op,
    pub value: String,
}

/// `@namespace/name/subpath` decomposition of a profile address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRef {
    pub namespace: String,
    pub name: String,
    /// Anything after `name` in the path part (possibly empty).
    pub remainder: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    File,
    Url,
    Profile,
    Stdio,
    Glob,
}

/// Parsed result of a user-supplied address string. Immutable; produced once
/// per invocation and never mutated afterward (spec.md §3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub raw: String,
    pub kind: AddressKind,
    pub protocol: Option<String>,
    pub path: String,
    pub format_hint: Option<String>,
    /// Decode order: first entry is the outermost (last-applied) codec.
    pub compression: Vec<Compression>,
    pub parameters: Vec<Parameter>,
    pub profile_ref: Option<ProfileRef>,
    pub is_glob: bool,
    /// Extension left over after compression suffixes were peeled and no
    /// explicit `~format` was given; a hint for format selection (spec.md
    /// §4.1 step 7), never committed to `format_hint` by the parser itself.
    pub residual_extension: Option<String>,
}

impl Address {
    pub fn is_stdio(&self) -> bool {
        self.kind == AddressKind::Stdio
    }

    /// Canonical re-rendering used by the round-trip property test (spec.md
    /// §8.1 invariant 1). Not guaranteed byte-identical to `raw`.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        match self.kind {
            AddressKind::Stdio => {
                out.push('-');
                if let Some(fmt) = &self.format_hint {
                    out.push('~');
                    out.push_str(fmt);
                }
                return out;
            }
            AddressKind::Profile => {
                let r = self.profile_ref.as_ref().expect("profile address without profile_ref");
                out.push('@');
                out.push_str(&r.namespace);
                out.push('/');
                out.push_str(&r.name);
                if !r.remainder.is_empty() {
                    out.push('/');
                    out.push_str(&r.remainder);
                }
                push_query(&mut out, &self.parameters);
                return out;
            }
            AddressKind::Url => {
                out.push_str(self.protocol.as_deref().unwrap_or(""));
                out.push_str("://");
                out.push_str(&self.path);
            }
            AddressKind::File | AddressKind::Glob => {
                out.push_str(&self.path);
            }
        }
        for c in &self.compression {
            out.push('.');
            out.push_str(c.suffix());
        }
        if let Some(fmt) = &self.format_hint {
            out.push('~');
            out.push_str(fmt);
        }
        push_query(&mut out, &self.parameters);
        out
    }
}

fn push_query(out: &mut String, params: &[Parameter]) {
    if params.is_empty() {
        return;
    }
    out.push('?');
    for (i, p) in params.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(&p.key);
        if p.op != Op::Eq {
            out.push_str(p.op.as_str());
        }
        out.push('=');
        out.push_str(&p.value);
    }
}

/// Parse a single address string (spec.md §4.1).
pub fn parse(raw: &str) -> Result<Address, CoreError> {
    if raw.is_empty() {
        return Err(CoreError::address_parse(raw, 0, "empty address"));
    }

    // Step 1: stdio.
    if let Some(rest) = raw.strip_prefix('-') {
        if rest.is_empty() {
            return Err(CoreError::address_parse(
                raw,
                0,
                "stdio address requires a ~format suffix",
            ));
        }
        let fmt = rest
            .strip_prefix('~')
            .ok_or_else(|| CoreError::address_parse(raw, 1, "expected '~format' after '-'"))?;
        if fmt.is_empty() {
            return Err(CoreError::address_parse(raw, 2, "'~' with no trailing format token"));
        }
        return Ok(Address {
            raw: raw.to_string(),
            kind: AddressKind::Stdio,
            protocol: None,
            path: "-".to_string(),
            format_hint: Some(fmt.to_string()),
            compression: Vec::new(),
            parameters: Vec::new(),
            profile_ref: None,
            is_glob: false,
            residual_extension: None,
        });
    }

    // Step 2: profile.
    if let Some(rest) = raw.strip_prefix('@') {
        let (namespace, path_and_query) = rest
            .split_once('/')
            .ok_or_else(|| CoreError::address_parse(raw, 1, "profile address requires '@namespace/name'"))?;
        if namespace.is_empty() {
            return Err(CoreError::address_parse(raw, 1, "empty profile namespace"));
        }
        let (path_part, query_part) = split_query(path_and_query);
        if path_part.is_empty() {
            return Err(CoreError::address_parse(raw, 2, "empty profile name"));
        }
        let (name, remainder) = match path_part.split_once('/') {
            Some((n, r)) => (n, r),
            None => (path_part, ""),
        };
        let parameters = parse_query(query_part)?;
        return Ok(Address {
            raw: raw.to_string(),
            kind: AddressKind::Profile,
            protocol: None,
            path: path_part.to_string(),
            format_hint: None,
            compression: Vec::new(),
            parameters,
            profile_ref: Some(ProfileRef {
                namespace: namespace.to_string(),
                name: name.to_string(),
                remainder: remainder.to_string(),
            }),
            is_glob: false,
            residual_extension: None,
        });
    }

    // Step 3: scheme.
    let (protocol, mut remainder) = match raw.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_lowercase()), rest),
        None => (None, raw),
    };

    // Step 4: query string.
    let (path_and_format, query_part) = split_query(remainder);
    remainder = path_and_format;

    // Step 5: format hint.
    let (mut path, format_hint) = match remainder.rsplit_once('~') {
        // Only treat '~' as a format separator if what follows has no '/'
        // (a bare path may legitimately contain '~' from a username, e.g.
        // an scp-style path) and is non-empty.
        Some((p, fmt)) if !fmt.is_empty() && !fmt.contains('/') => (p, Some(fmt.to_string())),
        Some((_, fmt)) if fmt.is_empty() => {
            return Err(CoreError::address_parse(raw, remainder.len(), "'~' with no trailing format token"));
        }
        _ => (remainder, None),
    };
    if path.is_empty() {
        path = remainder;
    }

    let parameters = parse_query(query_part)?;

    // Step 6: peel compression suffixes, right to left, decode order.
    let mut compression = Vec::new();
    let mut stripped = path.to_string();
    loop {
        let Some((base, ext)) = stripped.rsplit_once('.') else {
            break;
        };
        match Compression::from_suffix(ext) {
            Some(c) => {
                compression.push(c);
                stripped = base.to_string();
            }
            None => break,
        }
    }

    // Step 7: residual extension, only when no explicit format hint.
    let residual_extension = if format_hint.is_none() {
        stripped.rsplit_once('.').map(|(_, ext)| ext.to_string())
    } else {
        None
    };

    // Step 8: glob detection.
    let is_glob = stripped.contains('*') || stripped.contains('?') || (stripped.contains('{') && stripped.contains('}'));

    let kind = if protocol.is_some() {
        AddressKind::Url
    } else if is_glob {
        AddressKind::Glob
    } else {
        AddressKind::File
    };

    Ok(Address {
        raw: raw.to_string(),
        kind,
        protocol,
        path: stripped,
        format_hint,
        compression,
        parameters,
        profile_ref: None,
        is_glob,
        residual_extension,
    })
}

fn split_query(s: &str) -> (&str, Option<&str>) {
    match s.split_once('?') {
        Some((a, b)) => (a, Some(b)),
        None => (s, None),
    }
}

/// Parse a `key[op]=value&key2=value2` query fragment (spec.md §6.1).
/// Order-preserving; repeated keys and empty values/keys are kept.
pub fn parse_query(query: Option<&str>) -> Result<Vec<Parameter>, CoreError> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key_op, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v.to_string()),
            None => (pair, String::new()),
        };
        let (key, op) = split_op(key_op);
        out.push(Parameter {
            key: key.to_string(),
            op,
            value,
        });
    }
    Ok(out)
}

fn split_op(key_op: &str) -> (&str, Op) {
    for (suffix, op) in [
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("!=", Op::Ne),
        (">", Op::Gt),
        ("<", Op::Lt),
    ] {
        if let Some(k) = key_op.strip_suffix(suffix) {
            return (k, op);
        }
    }
    (key_op, Op::Eq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_requires_format() {
        assert!(parse("-").is_err());
        assert!(parse("-~csv").is_ok());
    }

    #[test]
    fn profile_parses_namespace_name_and_query() {
        let a = parse("@myapi/users?role=admin").unwrap();
        assert_eq!(a.kind, AddressKind::Profile);
        let r = a.profile_ref.unwrap();
        assert_eq!(r.namespace, "myapi");
        assert_eq!(r.name, "users");
        assert_eq!(a.parameters[0].key, "role");
        assert_eq!(a.parameters[0].value, "admin");
    }

    #[test]
    fn compression_order_is_decode_order() {
        let a = parse("x.a.gz.bz2").unwrap();
        assert_eq!(a.compression, vec![Compression::Bz2, Compression::Gzip]);
    }

    #[test]
    fn bare_path_has_no_protocol() {
        let a = parse("/data/t.csv").unwrap();
        assert_eq!(a.kind, AddressKind::File);
        assert!(a.protocol.is_none());
        assert_eq!(a.residual_extension.as_deref(), Some("csv"));
    }

    #[test]
    fn url_scheme_lowercased() {
        let a = parse("HTTP://example.com/x.json").unwrap();
        assert_eq!(a.protocol.as_deref(), Some("http"));
    }

    #[test]
    fn glob_detection() {
        let a = parse("/data/*.csv").unwrap();
        assert!(a.is_glob);
        assert_eq!(a.kind, AddressKind::Glob);
    }

    #[test]
    fn format_hint_overrides_residual_extension() {
        let a = parse("data.txt~csv").unwrap();
        assert_eq!(a.format_hint.as_deref(), Some("csv"));
        assert!(a.residual_extension.is_none());
    }

    #[test]
    fn empty_query_value_and_key_preserved() {
        let params = parse_query(Some("a=&=b")).unwrap();
        assert_eq!(params[0].key, "a");
        assert_eq!(params[0].value, "");
        assert_eq!(params[1].key, "");
        assert_eq!(params[1].value, "b");
    }

    #[test]
    fn operator_suffix_parsed() {
        let params = parse_query(Some("size>=10")).unwrap();
        assert_eq!(params[0].key, "size");
        assert_eq!(params[0].op, Op::Ge);
        assert_eq!(params[0].value, "10");
    }

    #[test]
    fn round_trip_preserves_fields() {
        for raw in ["-~csv", "@myapi/users?role=admin", "data.csv.gz", "http://x.com/y~json"] {
            let a = parse(raw).unwrap();
            let b = parse(&a.canonical()).unwrap();
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.protocol, b.protocol);
            assert_eq!(a.format_hint, b.format_hint);
            assert_eq!(a.compression, b.compression);
            assert_eq!(a.parameters, b.parameters);
            assert_eq!(a.profile_ref, b.profile_ref);
        }
    }
}
