use serde::{Deserialize, Deserializer, Serialize};

/// 字段用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldPurpose {
    FirstName,
    LastName,
    Email,
    Phone,
    Resume,
    CoverLetter,
    CustomQuestion,
    #[serde(other)]
    Unknown,
}

/// AI 识别出的表单字段（仅在单次尝试中存在，不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// CSS 选择器
    #[serde(alias = "fieldName")]
    pub selector: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(
        rename = "type",
        default = "default_field_type",
        deserialize_with = "field_type_or_text"
    )]
    pub field_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required: bool,
    #[serde(default = "unknown_purpose", deserialize_with = "purpose_or_unknown")]
    pub purpose: FieldPurpose,
}

// AI 经常把缺省值写成 null
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn field_type_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_field_type))
}

fn purpose_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FieldPurpose, D::Error> {
    Ok(Option::<FieldPurpose>::deserialize(deserializer)?.unwrap_or(FieldPurpose::Unknown))
}

fn default_field_type() -> String {
    "text".to_string()
}

fn unknown_purpose() -> FieldPurpose {
    FieldPurpose::Unknown
}

impl FormField {
    pub fn is_file_input(&self) -> bool {
        self.field_type.eq_ignore_ascii_case("file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ai_field_list() {
        let fields: Vec<FormField> = serde_json::from_str(
            r##"[
                {"fieldName": "#fname", "label": "First name", "type": "text", "required": true, "purpose": "firstName"},
                {"fieldName": "#cv", "label": "CV", "type": "file", "purpose": "resume"},
                {"fieldName": "#fav", "label": "Favourite colour", "type": "select", "purpose": "favouriteColour"}
            ]"##,
        )
        .unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].selector, "#fname");
        assert_eq!(fields[0].purpose, FieldPurpose::FirstName);
        assert!(fields[1].is_file_input());
        assert!(!fields[1].required);
        assert_eq!(fields[2].purpose, FieldPurpose::Unknown);
    }

    #[test]
    fn test_null_values_fall_back_to_defaults() {
        let field: FormField = serde_json::from_str(
            r##"{"fieldName": "#q1", "label": null, "type": null, "required": null, "purpose": null}"##,
        )
        .unwrap();

        assert_eq!(field.selector, "#q1");
        assert_eq!(field.label, "");
        assert_eq!(field.field_type, "text");
        assert!(!field.required);
        assert_eq!(field.purpose, FieldPurpose::Unknown);
    }
}
