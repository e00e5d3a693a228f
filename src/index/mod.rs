// Index records and storage

pub mod cache;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IndexError;

/// Metadata for a discovered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub last_modified: i64,
    pub relative_path: String,
}

/// A declared code symbol (function, class, method, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRecord {
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub line: usize,
    pub column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_static: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_async: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<Vec<String>>,
    /// Raw declaration line
    pub signature: String,
}

impl SymbolRecord {
    /// A bare record; rule-specific fields are filled in by the extractor.
    pub fn new(name: &str, kind: SymbolKind, file_path: &str, line: usize, column: usize, signature: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            file_path: file_path.to_string(),
            line,
            column,
            parameters: None,
            return_type: None,
            visibility: None,
            is_static: None,
            is_async: None,
            extends: None,
            implements: None,
            signature: signature.to_string(),
        }
    }
}

/// A single declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// An HTTP route declaration found in source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub path: String,
    pub method: HttpMethod,
    pub file_path: String,
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middleware: Option<Vec<String>>,
}

/// Directed edge from a source file to an import specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    /// Absolute path of the importing file
    pub from: String,
    /// Raw specifier as written in the source
    pub to: String,
    /// Heuristic absolute target; may point at a file that does not exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_to: Option<String>,
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    pub file_path: String,
    pub line: usize,
}

impl DependencyEdge {
    /// Resolved target when known, raw specifier otherwise
    pub fn target(&self) -> &str {
        self.resolved_to.as_deref().unwrap_or(&self.to)
    }
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Enum,
    Variable,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::Variable => "variable",
        }
    }
}

impl FromStr for SymbolKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "class" => Ok(SymbolKind::Class),
            "interface" => Ok(SymbolKind::Interface),
            "type" => Ok(SymbolKind::Type),
            "enum" => Ok(SymbolKind::Enum),
            "variable" => Ok(SymbolKind::Variable),
            _ => Err(IndexError::InvalidArgument(format!("Unknown symbol kind: {}", s))),
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

/// HTTP verbs recognised in route declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = IndexError;

    /// Case-insensitive, so both `.get(` and `@Get(` map here
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            "delete" => Ok(HttpMethod::Delete),
            "patch" => Ok(HttpMethod::Patch),
            "head" => Ok(HttpMethod::Head),
            "options" => Ok(HttpMethod::Options),
            _ => Err(IndexError::InvalidArgument(format!("Unknown HTTP method: {}", s))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependency edge kinds. Extraction only emits `Import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Import,
    Call,
    Extends,
    Implements,
    Uses,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_kind_round_trip() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Class,
            SymbolKind::Interface,
            SymbolKind::Type,
            SymbolKind::Enum,
            SymbolKind::Variable,
        ] {
            assert_eq!(kind.as_str().parse::<SymbolKind>().unwrap(), kind);
        }
        assert!("module".parse::<SymbolKind>().is_err());
    }

    #[test]
    fn test_http_method_is_case_insensitive() {
        assert_eq!("Get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("trace".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_edge_serializes_with_external_names() {
        let edge = DependencyEdge {
            from: "/p/src/a.ts".to_string(),
            to: "./b".to_string(),
            resolved_to: Some("/p/src/b.ts".to_string()),
            kind: DependencyKind::Import,
            file_path: "/p/src/a.ts".to_string(),
            line: 1,
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["resolvedTo"], "/p/src/b.ts");
        assert_eq!(json["type"], "import");
        assert_eq!(json["filePath"], "/p/src/a.ts");
    }

    #[test]
    fn test_unset_symbol_fields_are_omitted() {
        let symbol = SymbolRecord::new("Config", SymbolKind::Interface, "/p/a.ts", 3, 1, "interface Config {");
        let json = serde_json::to_value(&symbol).unwrap();
        assert!(json.get("parameters").is_none());
        assert!(json.get("isAsync").is_none());
        assert_eq!(json["kind"], "interface");
    }
}
