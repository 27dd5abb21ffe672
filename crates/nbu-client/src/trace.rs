//! Injectable request-span capability.
//!
//! [`Transport`](crate::Transport) opens one span per HTTP exchange through the
//! configured [`Tracer`]. [`NoopTracer`] is the default and records nothing;
//! [`LogTracer`] turns every finished span into a `tracing` debug event.

use std::fmt;
use std::time::Instant;

use tracing::debug;

/// Attribute value attached to a span.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Str(String),
    I64(i64),
    F64(f64),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Str(s) => f.write_str(s),
            AttributeValue::I64(v) => write!(f, "{v}"),
            AttributeValue::F64(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::I64(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::F64(value)
    }
}

/// A started span. Dropping a span without calling [`Span::end`] discards it.
pub trait Span: Send {
    fn set_attribute(&mut self, key: &'static str, value: AttributeValue);

    /// Marks the span as failed.
    fn record_error(&mut self, message: &str);

    fn end(self: Box<Self>);
}

/// Span factory handed to the transport at construction.
pub trait Tracer: Send + Sync + fmt::Debug {
    fn start_span(&self, name: &str) -> Box<dyn Span>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

struct NoopSpan;

impl Span for NoopSpan {
    fn set_attribute(&mut self, _key: &'static str, _value: AttributeValue) {}
    fn record_error(&mut self, _message: &str) {}
    fn end(self: Box<Self>) {}
}

impl Tracer for NoopTracer {
    fn start_span(&self, _name: &str) -> Box<dyn Span> {
        Box::new(NoopSpan)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

struct LogSpan {
    name: String,
    started: Instant,
    attributes: Vec<(&'static str, AttributeValue)>,
    error: Option<String>,
}

impl Span for LogSpan {
    fn set_attribute(&mut self, key: &'static str, value: AttributeValue) {
        self.attributes.push((key, value));
    }

    fn record_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    fn end(self: Box<Self>) {
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;

        match &self.error {
            Some(error) => debug!(
                span_name = %self.name,
                elapsed_ms,
                status = "error",
                error = %error,
                "{attributes}"
            ),
            None => debug!(span_name = %self.name, elapsed_ms, status = "ok", "{attributes}"),
        }
    }
}

impl Tracer for LogTracer {
    fn start_span(&self, name: &str) -> Box<dyn Span> {
        Box::new(LogSpan {
            name: name.to_string(),
            started: Instant::now(),
            attributes: Vec::new(),
            error: None,
        })
    }
}
