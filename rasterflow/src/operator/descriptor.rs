//! Explicit operator schemas.

/// Declared parameter of an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub description: Option<String>,
    pub default_value: Option<String>,
    pub required: bool,
}

impl ParameterSpec {
    /// Optional parameter without default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            default_value: None,
            required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Name, alias, declared sources/targets and parameters of an operator.
///
/// Hosts use the descriptor to wire graphs and validate parameters; the
/// engine itself only uses the alias (or name) to label contexts and errors.
///
/// # Example
///
/// ```
/// use rasterflow::operator::{OperatorDescriptor, ParameterSpec};
///
/// let descriptor = OperatorDescriptor::new("BandMathsOp")
///     .with_alias("BandMaths")
///     .with_source("source")
///     .with_target("result")
///     .with_parameter(ParameterSpec::new("expression").required());
/// assert_eq!(descriptor.label(), "BandMaths");
/// assert!(descriptor.parameter("expression").is_some_and(|p| p.required));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorDescriptor {
    pub name: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub sources: Vec<String>,
    pub targets: Vec<String>,
    pub parameters: Vec<ParameterSpec>,
}

impl OperatorDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Descriptor named after a Rust type (last path segment).
    pub fn for_type<T: ?Sized>() -> Self {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::new(short)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_source(mut self, name: impl Into<String>) -> Self {
        self.sources.push(name.into());
        self
    }

    pub fn with_target(mut self, name: impl Into<String>) -> Self {
        self.targets.push(name.into());
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Alias if set, otherwise the name.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Names of required parameters missing from `provided`.
    pub fn missing_parameters<'a>(&'a self, provided: &[&str]) -> Vec<&'a str> {
        self.parameters
            .iter()
            .filter(|p| p.required && p.default_value.is_none())
            .filter(|p| !provided.contains(&p.name.as_str()))
            .map(|p| p.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ResampleOp;

    #[test]
    fn test_for_type_uses_short_name() {
        let descriptor = OperatorDescriptor::for_type::<ResampleOp>();
        assert_eq!(descriptor.name, "ResampleOp");
        assert_eq!(descriptor.label(), "ResampleOp");
    }

    #[test]
    fn test_missing_parameters() {
        let descriptor = OperatorDescriptor::new("Op")
            .with_parameter(ParameterSpec::new("a").required())
            .with_parameter(ParameterSpec::new("b").required().with_default("1"))
            .with_parameter(ParameterSpec::new("c"));
        assert_eq!(descriptor.missing_parameters(&[]), vec!["a"]);
        assert!(descriptor.missing_parameters(&["a"]).is_empty());
    }
}
