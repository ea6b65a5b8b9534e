use std::fmt;

/// Scalar value attached to an access-log field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Int(v) => write!(f, "{}", v),
            LogValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<usize> for LogValue {
    fn from(v: usize) -> Self {
        LogValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<i64> for LogValue {
    fn from(v: i64) -> Self {
        LogValue::Int(v)
    }
}

impl From<&str> for LogValue {
    fn from(v: &str) -> Self {
        LogValue::Text(v.to_string())
    }
}

impl From<String> for LogValue {
    fn from(v: String) -> Self {
        LogValue::Text(v)
    }
}

/// Diagnostic fields collected while a single request is handled.
///
/// Handlers and the instrumentation layer both write into it; the layer
/// renders it into the access log line when the request is sampled.
/// Setting an existing field replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogInfo {
    fields: Vec<(&'static str, LogValue)>,
}

impl LogInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: impl Into<LogValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&LogValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for LogInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}
