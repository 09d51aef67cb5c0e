//! Content negotiation and response dispatch
//!
//! A [`Responder`] holds one [`Branch`] per format. Dispatching it through
//! [`ExecutionContext::respond_to`] executes exactly one branch, chosen by
//! the request's negotiated [`Format`].
//!
//! ```rust,ignore
//! let responder = Responder::new()
//!     .html(Branch::render("show"))
//!     .json_and_xml(Branch::Payload(Payload::new("widget", json!({"id": 7}))));
//! ctx.respond_to(responder, &views)?;
//! ```

use std::fmt;

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::naming::singularize;
use crate::views::{ViewContext, Views};

/// Response format requested by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// Server-rendered HTML
    #[default]
    Html,
    /// JSON payload
    Json,
    /// XML payload
    Xml,
    /// Anything else, by extension or media type
    Other(String),
}

impl Format {
    /// Format for a path extension or `format` parameter
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "html" | "htm" => Self::Html,
            "json" => Self::Json,
            "xml" => Self::Xml,
            other => Self::Other(other.to_string()),
        }
    }

    /// Format for a single media type, if recognised
    #[must_use]
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let media_type = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            "text/html" | "application/xhtml+xml" | "*/*" | "text/*" => Some(Self::Html),
            "application/json" | "text/json" => Some(Self::Json),
            "application/xml" | "text/xml" => Some(Self::Xml),
            other if other.ends_with("+json") => Some(Self::Json),
            other if other.ends_with("+xml") => Some(Self::Xml),
            _ => None,
        }
    }

    /// Format for an `Accept` header value
    ///
    /// The first recognised media type wins. An empty header means HTML; a
    /// header with no recognised type yields [`Format::Other`].
    #[must_use]
    pub fn from_accept(accept: &str) -> Self {
        let mut first = None;
        for candidate in accept.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            if let Some(format) = Self::from_media_type(candidate) {
                return format;
            }
            first.get_or_insert(candidate);
        }
        match first {
            Some(media_type) => {
                let media_type = media_type.split(';').next().unwrap_or(media_type).trim();
                Self::Other(media_type.to_string())
            }
            None => Self::Html,
        }
    }

    /// Negotiate from an explicit extension, then the `Accept` header
    #[must_use]
    pub fn negotiate(headers: &HeaderMap, extension: Option<&str>) -> Self {
        if let Some(extension) = extension {
            return Self::from_extension(extension);
        }
        headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
            .map_or(Self::Html, Self::from_accept)
    }

    /// Whether the format carries a structured payload
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json | Self::Xml)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => f.write_str("html"),
            Self::Json => f.write_str("json"),
            Self::Xml => f.write_str("xml"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// A structured payload emitted as JSON or XML
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Root element name for XML
    pub root: String,
    /// Payload body
    pub body: Value,
    /// Response status
    pub status: StatusCode,
    /// Optional `Location` header
    pub location: Option<String>,
}

impl Payload {
    /// Create a `200 OK` payload
    pub fn new(root: impl Into<String>, body: Value) -> Self {
        Self {
            root: root.into(),
            body,
            status: StatusCode::OK,
            location: None,
        }
    }

    /// Set the response status
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a `Location` header
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Encode the payload for `format`
    ///
    /// Formats other than XML are encoded as JSON.
    #[must_use]
    pub fn into_response_for(self, format: &Format) -> Response {
        let mut response = match format {
            Format::Xml => (
                self.status,
                [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
                to_xml(&self.root, &self.body),
            )
                .into_response(),
            _ => (self.status, Json(self.body)).into_response(),
        };

        if let Some(location) = self.location {
            if let Ok(value) = HeaderValue::from_str(&location) {
                response.headers_mut().insert(header::LOCATION, value);
            }
        }

        response
    }
}

/// One way of answering a request
#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    /// Render a named view
    Render {
        /// View name
        view: String,
        /// Response status
        status: StatusCode,
    },
    /// Redirect with `303 See Other`
    Redirect {
        /// Target location
        location: String,
    },
    /// Emit a structured payload
    Payload(Payload),
}

impl Branch {
    /// Render a view with `200 OK`
    pub fn render(view: impl Into<String>) -> Self {
        Self::Render {
            view: view.into(),
            status: StatusCode::OK,
        }
    }

    /// Render a view with a specific status
    pub fn render_with_status(view: impl Into<String>, status: StatusCode) -> Self {
        Self::Render {
            view: view.into(),
            status,
        }
    }

    /// Redirect to a location
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
        }
    }
}

/// Branches keyed by format
#[derive(Debug, Clone, Default)]
pub struct Responder {
    html: Option<Branch>,
    json: Option<Branch>,
    xml: Option<Branch>,
    fallback: Option<Branch>,
}

impl Responder {
    /// Create a responder with no branches
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Branch for HTML requests
    #[must_use]
    pub fn html(mut self, branch: Branch) -> Self {
        self.html = Some(branch);
        self
    }

    /// Branch for JSON requests
    #[must_use]
    pub fn json(mut self, branch: Branch) -> Self {
        self.json = Some(branch);
        self
    }

    /// Branch for XML requests
    #[must_use]
    pub fn xml(mut self, branch: Branch) -> Self {
        self.xml = Some(branch);
        self
    }

    /// Same branch for JSON and XML requests
    #[must_use]
    pub fn json_and_xml(self, branch: Branch) -> Self {
        self.json(branch.clone()).xml(branch)
    }

    /// Branch for formats without a dedicated branch
    #[must_use]
    pub fn fallback(mut self, branch: Branch) -> Self {
        self.fallback = Some(branch);
        self
    }

    /// The single branch that answers `format`
    #[must_use]
    pub fn select(self, format: &Format) -> Option<Branch> {
        let branch = match format {
            Format::Html => self.html,
            Format::Json => self.json,
            Format::Xml => self.xml,
            Format::Other(_) => None,
        };
        branch.or(self.fallback)
    }
}

impl<E> ExecutionContext<E> {
    /// Dispatch a responder: execute exactly one branch and emit its response
    ///
    /// Marks the context as responded even when no branch matches; an
    /// unmatched format produces `406 Not Acceptable`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or a response was already emitted.
    pub fn respond_to(&mut self, responder: Responder, views: &dyn Views<E>) -> Result<()> {
        self.mark_responded();
        let format = self.request().format().clone();

        let Some(branch) = responder.select(&format) else {
            tracing::debug!(%format, "No branch for requested format");
            return self.respond(StatusCode::NOT_ACCEPTABLE);
        };

        let response = match branch {
            Branch::Render { view, status } => {
                let body = views.render(&view, &ViewContext::new(self))?;
                tracing::debug!(view = %view, status = status.as_u16(), "Rendered view");
                (status, Html(body)).into_response()
            }
            Branch::Redirect { location } => {
                tracing::debug!(location = %location, "Redirecting");
                Redirect::to(&location).into_response()
            }
            Branch::Payload(payload) => payload.into_response_for(&format),
        };

        self.respond(response)
    }
}

/// Encode a JSON value as an XML document
///
/// Objects become nested elements, arrays become `type="array"` elements whose
/// children are named after the singular of the parent, and `null` becomes an
/// empty element with `nil="true"`. Underscores in names are dasherized.
#[must_use]
pub fn to_xml(root: &str, value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(&mut out, root, value);
    out
}

fn write_element(out: &mut String, name: &str, value: &Value) {
    let tag = element_name(name);
    match value {
        Value::Null => {
            out.push_str(&format!("<{tag} nil=\"true\"/>"));
        }
        Value::Bool(flag) => {
            out.push_str(&format!("<{tag} type=\"boolean\">{flag}</{tag}>"));
        }
        Value::Number(number) => {
            let kind = if number.is_f64() { "float" } else { "integer" };
            out.push_str(&format!("<{tag} type=\"{kind}\">{number}</{tag}>"));
        }
        Value::String(text) => {
            out.push_str(&format!("<{tag}>{}</{tag}>", escape(text)));
        }
        Value::Array(items) => {
            let child = singularize(name);
            out.push_str(&format!("<{tag} type=\"array\">"));
            for item in items {
                write_element(out, &child, item);
            }
            out.push_str(&format!("</{tag}>"));
        }
        Value::Object(fields) => {
            out.push_str(&format!("<{tag}>"));
            for (key, field) in fields {
                write_element(out, key, field);
            }
            out.push_str(&format!("</{tag}>"));
        }
    }
}

fn element_name(name: &str) -> String {
    let mut tag: String = name
        .chars()
        .map(|c| match c {
            '_' => '-',
            c if c.is_alphanumeric() || c == '-' || c == '.' => c,
            _ => '-',
        })
        .collect();
    if !tag.starts_with(|c: char| c.is_alphabetic()) {
        tag.insert(0, 'x');
    }
    tag
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
