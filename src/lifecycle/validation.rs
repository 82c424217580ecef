//! Normalization and field rules for visit registration.

use std::collections::HashMap;

use crate::db::{DocumentType, RegisterVisitRequest};

/// Escape markup characters and trim surrounding whitespace
pub fn sanitize_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(c),
        }
    }
    out
}

fn sanitize_optional(value: Option<&str>) -> Option<String> {
    value.map(sanitize_text).filter(|v| !v.is_empty())
}

/// A registration request after sanitization and field checks
#[derive(Debug, Clone, PartialEq)]
pub struct ValidVisit {
    pub name: String,
    pub document: String,
    pub document_type: DocumentType,
    pub phone: Option<String>,
    pub relationship: String,
    pub patient_name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default)]
struct FieldErrors(HashMap<String, Vec<String>>);

impl FieldErrors {
    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    fn require(&mut self, field: &str, label: &str, value: &str, min_chars: usize) {
        let len = value.chars().count();
        if len == 0 {
            self.add(field, format!("{} is required", label));
        } else if len < min_chars {
            self.add(
                field,
                format!("{} must be at least {} characters", label, min_chars),
            );
        }
    }
}

/// Sanitize and validate a registration request.
///
/// All field problems are collected and returned together.
pub fn validate_registration(
    req: &RegisterVisitRequest,
) -> Result<ValidVisit, HashMap<String, Vec<String>>> {
    let name = sanitize_text(&req.name);
    let document = sanitize_text(&req.document);
    let relationship = sanitize_text(&req.relationship);
    let patient_name = sanitize_text(&req.patient_name);

    let mut errors = FieldErrors::default();
    errors.require("name", "Visitor name", &name, 2);
    errors.require("document", "Document", &document, 3);
    errors.require("relationship", "Relationship", &relationship, 2);
    errors.require("patientName", "Patient name", &patient_name, 2);

    let document_type = match req.document_type.trim() {
        "" => {
            errors.add("documentType", "Document type is required");
            None
        }
        raw => match raw.parse::<DocumentType>() {
            Ok(doc) => Some(doc),
            Err(e) => {
                errors.add("documentType", e);
                None
            }
        },
    };

    match document_type {
        Some(document_type) if errors.0.is_empty() => Ok(ValidVisit {
            name,
            document,
            document_type,
            phone: sanitize_optional(req.phone.as_deref()),
            relationship,
            patient_name,
            notes: sanitize_optional(req.notes.as_deref()),
        }),
        _ => Err(errors.0),
    }
}
