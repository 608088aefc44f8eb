//! Index environment: the per-schema field registry a `Matcher` builds once
//! at construction (§4.10), independent of any particular request.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrigin {
    Attribute,
    Index,
    /// An index field with an attribute of the same name backing it, so a
    /// query against it can be served from either source.
    ShadowAttribute,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub origin: FieldOrigin,
    /// `true` for a field this schema imports from a parent/reference document.
    pub imported: bool,
    /// `true` for the synthetic "virtual" parent of a dotted struct-field
    /// attribute, e.g. `"ratings"` for a schema field named `"ratings.count"`.
    pub virtual_parent: bool,
}

/// The internal hidden field every `IndexEnvironment` carries for whitelist
/// composition against the document meta store (§4.3, §4.10).
pub const DOCUMENT_META_STORE_FIELD: &str = "[documentmetastore]";

#[derive(Debug, Clone, Default)]
pub struct IndexEnvironment {
    fields: HashMap<String, FieldInfo>,
}

impl IndexEnvironment {
    /// Builds the dense field registry from a schema's declared fields and its
    /// imported-attribute list: tags attribute-backed index fields as shadow
    /// attributes, registers imported attributes, adds the hidden meta-store
    /// field, and derives virtual parent fields from dotted struct-field names.
    pub fn build(attribute_fields: &[&str], index_fields: &[&str], imported_attributes: &[&str]) -> Self {
        let attribute_set: std::collections::HashSet<&str> = attribute_fields.iter().copied().collect();
        let mut fields = HashMap::new();

        for &name in index_fields {
            let origin = if attribute_set.contains(name) { FieldOrigin::ShadowAttribute } else { FieldOrigin::Index };
            fields.insert(name.to_string(), FieldInfo { name: name.to_string(), origin, imported: false, virtual_parent: false });
        }
        for &name in attribute_fields {
            fields.entry(name.to_string()).or_insert_with(|| FieldInfo {
                name: name.to_string(),
                origin: FieldOrigin::Attribute,
                imported: false,
                virtual_parent: false,
            });
        }
        for &name in imported_attributes {
            fields.insert(name.to_string(), FieldInfo { name: name.to_string(), origin: FieldOrigin::Attribute, imported: true, virtual_parent: false });
        }

        fields.insert(
            DOCUMENT_META_STORE_FIELD.to_string(),
            FieldInfo { name: DOCUMENT_META_STORE_FIELD.to_string(), origin: FieldOrigin::Attribute, imported: false, virtual_parent: false },
        );

        let parents: Vec<String> = fields
            .values()
            .filter_map(|f| f.name.rsplit_once('.').map(|(parent, _)| parent.to_string()))
            .collect();
        for parent in parents {
            fields.entry(parent.clone()).or_insert_with(|| FieldInfo {
                name: parent,
                origin: FieldOrigin::Attribute,
                imported: false,
                virtual_parent: true,
            });
        }

        IndexEnvironment { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.values()
    }
}
