//! Runtime support module emitted alongside generated code
//!
//! Generated decoders, validators, error dispatch and stream adapters only
//! depend on the items below. The emitted module needs the `base64` and
//! `regex` crates in the generated crate.

use proc_macro2::TokenStream;
use quote::quote;

use crate::config::CodegenConfig;
use crate::lower::ident;

/// Tokens of the support module named by `config.support_path`.
pub fn tokens(config: &CodegenConfig) -> TokenStream {
    let name = ident(
        config
            .support_path
            .rsplit("::")
            .next()
            .unwrap_or(config.support_path.as_str()),
    );
    let body = body_tokens();
    quote! {
        pub mod #name {
            #body
        }
    }
}

fn body_tokens() -> TokenStream {
    quote! {
        use std::fmt;

        /// Read access to incoming headers, trailers or metadata.
        pub trait MetadataSource {
            fn get(&self, key: &str) -> Option<String>;
            fn get_all(&self, key: &str) -> Vec<String>;
            fn get_bin(&self, key: &str) -> Option<Vec<u8>>;
        }

        /// Write access to outgoing headers, trailers or metadata.
        pub trait MetadataSink {
            fn append(&mut self, key: &str, value: String);
            fn append_bin(&mut self, key: &str, value: Vec<u8>);
        }

        #[derive(Debug, Clone, PartialEq)]
        pub enum FieldErrorKind {
            Missing,
            InvalidType { value: String, expected: &'static str },
            Invalid(String),
        }

        #[derive(Debug, Clone, PartialEq)]
        pub struct FieldError {
            pub field: String,
            pub kind: FieldErrorKind,
        }

        impl FieldError {
            pub fn missing(field: &str) -> Self {
                Self {
                    field: field.to_string(),
                    kind: FieldErrorKind::Missing,
                }
            }

            pub fn invalid_type(field: &str, value: &str, expected: &'static str) -> Self {
                Self {
                    field: field.to_string(),
                    kind: FieldErrorKind::InvalidType {
                        value: value.to_string(),
                        expected,
                    },
                }
            }

            pub fn invalid(field: &str, message: impl Into<String>) -> Self {
                Self {
                    field: field.to_string(),
                    kind: FieldErrorKind::Invalid(message.into()),
                }
            }
        }

        impl fmt::Display for FieldError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match &self.kind {
                    FieldErrorKind::Missing => write!(f, "{} is missing", self.field),
                    FieldErrorKind::InvalidType { value, expected } => {
                        write!(f, "{}: {:?} is not a valid {}", self.field, value, expected)
                    }
                    FieldErrorKind::Invalid(message) => write!(f, "{}: {}", self.field, message),
                }
            }
        }

        /// Every field failure found while decoding one message.
        #[derive(Debug, Clone, PartialEq)]
        pub struct DecodeError {
            pub errors: Vec<FieldError>,
        }

        impl DecodeError {
            pub fn new(errors: Vec<FieldError>) -> Self {
                Self { errors }
            }

            /// The failures with their field paths rooted at `parent`.
            pub fn nested(self, parent: &str) -> Vec<FieldError> {
                self.errors
                    .into_iter()
                    .map(|mut e| {
                        e.field = format!("{}.{}", parent, e.field);
                        e
                    })
                    .collect()
            }
        }

        impl fmt::Display for DecodeError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let parts: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
                f.write_str(&parts.join("; "))
            }
        }

        impl std::error::Error for DecodeError {}

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Status {
            Http(u16),
            Grpc(i32),
        }

        /// An error that matches no declared error of the method.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct ServiceError {
            pub name: String,
            pub id: String,
            pub message: String,
            pub temporary: bool,
            pub timeout: bool,
            pub fault: bool,
        }

        impl fmt::Display for ServiceError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}: {}", self.name, self.message)
            }
        }

        impl std::error::Error for ServiceError {}

        #[derive(Debug)]
        pub enum StreamError {
            Closed,
            Transport(String),
            Decode(DecodeError),
        }

        impl fmt::Display for StreamError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    StreamError::Closed => f.write_str("stream closed"),
                    StreamError::Transport(message) => write!(f, "transport error: {}", message),
                    StreamError::Decode(err) => write!(f, "decode error: {}", err),
                }
            }
        }

        impl std::error::Error for StreamError {}

        pub trait StreamSink<T> {
            fn send(&mut self, item: T) -> Result<(), StreamError>;
            fn close(&mut self) -> Result<(), StreamError>;
        }

        pub trait StreamSource<T> {
            /// `Ok(None)` once the peer has closed its side.
            fn recv(&mut self) -> Result<Option<T>, StreamError>;
        }

        /// Removes a leading `scheme ` label, compared case-insensitively.
        pub fn strip_scheme(raw: &str, scheme: &str) -> String {
            let trimmed = raw.trim_start();
            match (trimmed.get(..scheme.len()), trimmed.get(scheme.len()..)) {
                (Some(label), Some(rest))
                    if label.eq_ignore_ascii_case(scheme) && rest.starts_with(' ') =>
                {
                    rest.trim_start().to_string()
                }
                _ => raw.to_string(),
            }
        }

        pub fn decode_basic_auth(raw: &str) -> Option<(String, String)> {
            use base64::Engine as _;
            let encoded = strip_scheme(raw, "Basic");
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .ok()?;
            let text = String::from_utf8(bytes).ok()?;
            let (user, password) = text.split_once(':')?;
            Some((user.to_string(), password.to_string()))
        }

        pub fn encode_basic_auth(user: &str, password: &str) -> String {
            use base64::Engine as _;
            let encoded = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", user, password));
            format!("Basic {}", encoded)
        }

        /// Accepts `1`, `t`, `T`, `TRUE`, `true`, `True` and their false
        /// counterparts.
        pub fn parse_bool(raw: &str) -> Option<bool> {
            match raw {
                "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
                "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
                _ => None,
            }
        }

        pub fn matches_pattern(value: &str, pattern: &str) -> bool {
            regex::Regex::new(pattern)
                .map(|re| re.is_match(value))
                .unwrap_or(false)
        }

        /// Checks a well-known string format. Unknown formats pass.
        pub fn check_format(value: &str, format: &str) -> Result<(), String> {
            let ok = match format {
                "email" => value
                    .split_once('@')
                    .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.')),
                "uuid" => {
                    value.len() == 36
                        && value.char_indices().all(|(i, c)| match i {
                            8 | 13 | 18 | 23 => c == '-',
                            _ => c.is_ascii_hexdigit(),
                        })
                }
                "ipv4" => value.parse::<std::net::Ipv4Addr>().is_ok(),
                "ipv6" => value.parse::<std::net::Ipv6Addr>().is_ok(),
                "ip" => value.parse::<std::net::IpAddr>().is_ok(),
                "uri" => value
                    .split_once("://")
                    .is_some_and(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty()),
                "date" => {
                    value.len() == 10
                        && value.char_indices().all(|(i, c)| match i {
                            4 | 7 => c == '-',
                            _ => c.is_ascii_digit(),
                        })
                }
                _ => true,
            };
            if ok {
                Ok(())
            } else {
                Err(format!("must be a valid {}", format))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_module_parses() {
        let tokens = tokens(&CodegenConfig::default());
        let module: syn::ItemMod = syn::parse2(tokens).unwrap();
        assert_eq!(module.ident, "support");
        let (_, items) = module.content.unwrap();
        let names: Vec<String> = items
            .iter()
            .filter_map(|item| match item {
                syn::Item::Trait(t) => Some(t.ident.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(
            names,
            vec!["MetadataSource", "MetadataSink", "StreamSink", "StreamSource"]
        );
    }
}
