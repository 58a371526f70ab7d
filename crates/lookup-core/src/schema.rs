use crate::error::{LookupError, Result};
use crate::types::DataType;
use arrow::datatypes::{Field as ArrowField, Schema as ArrowSchema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Same field under another name (used for renamed return values).
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: self.data_type,
            nullable: self.nullable,
        }
    }

    pub fn to_arrow(&self) -> ArrowField {
        ArrowField::new(self.name.clone(), self.data_type.to_arrow(), self.nullable)
    }
}

/// Ordered row metadata. Field names are looked up once when a step is
/// initialized; per-row access goes through the resolved offsets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self { fields: vec![] }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| LookupError::ColumnNotFound(name.to_string()))
    }

    /// Case-insensitive search, the way database catalogs report column
    /// names in whatever case they were declared.
    pub fn search(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .or_else(|| self.fields.iter().find(|f| f.name().eq_ignore_ascii_case(name)))
    }

    pub fn field_with_name(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| LookupError::ColumnNotFound(name.to_string()))
    }

    /// A new schema with `other`'s fields appended after this one's.
    pub fn join(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema { fields }
    }

    pub fn data_types(&self) -> Vec<DataType> {
        self.fields.iter().map(|f| *f.data_type()).collect()
    }

    pub fn to_arrow(&self) -> ArrowSchema {
        let fields: Vec<ArrowField> = self.fields.iter().map(|f| f.to_arrow()).collect();
        ArrowSchema::new(fields)
    }

    pub fn from_arrow(schema: &ArrowSchema) -> Self {
        let fields = schema
            .fields()
            .iter()
            .map(|f| {
                Field::new(
                    f.name(),
                    DataType::from_arrow(f.data_type()),
                    f.is_nullable(),
                )
            })
            .collect();
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("Name", DataType::Utf8, true),
        ])
    }

    #[test]
    fn test_index_of() {
        let schema = schema();
        assert_eq!(schema.index_of("id").unwrap(), 0);
        assert!(matches!(
            schema.index_of("missing"),
            Err(LookupError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_search_ignores_case() {
        let schema = schema();
        assert_eq!(schema.search("name").unwrap().name(), "Name");
        assert!(schema.search("nope").is_none());
    }

    #[test]
    fn test_join_appends() {
        let joined = schema().join(&Schema::new(vec![Field::new(
            "extra",
            DataType::Float64,
            true,
        )]));
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.index_of("extra").unwrap(), 2);
    }

    #[test]
    fn test_arrow_round_trip() {
        let schema = schema();
        assert_eq!(Schema::from_arrow(&schema.to_arrow()), schema);
    }
}
