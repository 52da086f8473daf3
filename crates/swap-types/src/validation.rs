//! Configuration validation for pluggable implementations.
//!
//! Each ledger implementation is configured through a free-form TOML table.
//! Implementations describe the table they expect with a [`Schema`] and
//! expose it through [`ConfigSchema`] so the loader can reject bad tables
//! before anything connects to a ledger.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
}

/// Expected shape of a configuration value.
#[derive(Debug, Clone)]
pub enum FieldType {
	String,
	/// An `http://` or `https://` endpoint.
	Url,
	Integer {
		min: Option<i64>,
		max: Option<i64>,
	},
	Boolean,
	/// A `0x`-prefixed or bare hex string of exactly `bytes` bytes.
	Hex { bytes: usize },
	Array(Box<FieldType>),
}

impl FieldType {
	fn expected(&self) -> &'static str {
		match self {
			FieldType::String | FieldType::Url | FieldType::Hex { .. } => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
			FieldType::Array(_) => "array",
		}
	}

	fn check(&self, name: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = || ValidationError::TypeMismatch {
			field: name.to_string(),
			expected: self.expected(),
			actual: value.type_str().to_string(),
		};
		let invalid = |message: String| ValidationError::InvalidValue {
			field: name.to_string(),
			message,
		};

		match self {
			FieldType::String => {
				value.as_str().ok_or_else(mismatch)?;
			}
			FieldType::Url => {
				let url = value.as_str().ok_or_else(mismatch)?;
				if !(url.starts_with("http://") || url.starts_with("https://")) {
					return Err(invalid("URL must start with http:// or https://".into()));
				}
			}
			FieldType::Integer { min, max } => {
				let v = value.as_integer().ok_or_else(mismatch)?;
				if let Some(min) = min.filter(|min| v < *min) {
					return Err(invalid(format!("{} is less than minimum {}", v, min)));
				}
				if let Some(max) = max.filter(|max| v > *max) {
					return Err(invalid(format!("{} is greater than maximum {}", v, max)));
				}
			}
			FieldType::Boolean => {
				value.as_bool().ok_or_else(mismatch)?;
			}
			FieldType::Hex { bytes } => {
				let s = value.as_str().ok_or_else(mismatch)?;
				let digits = s.strip_prefix("0x").unwrap_or(s);
				let decoded = hex::decode(digits).map_err(|_| invalid("not valid hex".into()))?;
				if decoded.len() != *bytes {
					return Err(invalid(format!(
						"expected {} bytes, got {}",
						bytes,
						decoded.len()
					)));
				}
			}
			FieldType::Array(inner) => {
				let items = value.as_array().ok_or_else(mismatch)?;
				for (i, item) in items.iter().enumerate() {
					inner.check(&format!("{}[{}]", name, i), item)?;
				}
			}
		}
		Ok(())
	}
}

/// A named field with its type.
#[derive(Debug, Clone)]
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
		}
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug, Clone)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table",
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.field_type.check(&field.name, value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.field_type.check(&field.name, value)?;
			}
		}

		Ok(())
	}
}

/// Implemented by anything configured through a TOML table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Schema {
		Schema::new(
			vec![
				Field::new("rpc_url", FieldType::Url),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![
				Field::new("scheduler", FieldType::Hex { bytes: 20 }),
				Field::new("tags", FieldType::Array(Box::new(FieldType::String))),
			],
		)
	}

	#[test]
	fn test_valid_table() {
		let config: toml::Value = toml::from_str(
			r#"
			rpc_url = "https://rpc.example"
			chain_id = 245022926
			scheduler = "0x0000000000000000000000000000000000000001"
			tags = ["a", "b"]
			"#,
		)
		.unwrap();
		assert!(schema().validate(&config).is_ok());
	}

	#[test]
	fn test_missing_and_invalid_fields() {
		let missing: toml::Value = toml::from_str(r#"rpc_url = "https://rpc.example""#).unwrap();
		assert_eq!(
			schema().validate(&missing),
			Err(ValidationError::MissingField("chain_id".into()))
		);

		let bad_url: toml::Value = toml::from_str(
			r#"
			rpc_url = "ftp://rpc.example"
			chain_id = 1
			"#,
		)
		.unwrap();
		assert!(matches!(
			schema().validate(&bad_url),
			Err(ValidationError::InvalidValue { field, .. }) if field == "rpc_url"
		));

		let bad_chain: toml::Value = toml::from_str(
			r#"
			rpc_url = "http://localhost:8545"
			chain_id = 0
			"#,
		)
		.unwrap();
		assert!(schema().validate(&bad_chain).is_err());
	}

	#[test]
	fn test_array_items_are_checked() {
		let config: toml::Value = toml::from_str(
			r#"
			rpc_url = "http://localhost:8545"
			chain_id = 1
			tags = ["ok", 3]
			"#,
		)
		.unwrap();
		assert_eq!(
			schema().validate(&config),
			Err(ValidationError::TypeMismatch {
				field: "tags[1]".into(),
				expected: "string",
				actual: "integer".into(),
			})
		);
	}
}
