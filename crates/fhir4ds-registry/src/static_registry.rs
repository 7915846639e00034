//! Reference, in-memory [`TypeRegistry`](crate::TypeRegistry) implementation.
//!
//! The element tables below are a curated subset covering the resources
//! named in spec §3 and the end-to-end scenarios in spec §8, recovered from
//! `FHIRElementTypeResolver._initialize_element_types` in the original
//! Python source. A production registry would instead be distilled from
//! FHIR StructureDefinitions (spec §1 names that loading as out of scope).

use crate::TypeRegistry;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ElementDef {
    fhir_type: &'static str,
    is_array: bool,
}

/// A `value[x]`-style choice element: `prefix` (`value`, `effective`, ...)
/// expands into `prefix<Suffix>` for each entry in `variants`.
#[derive(Debug, Clone)]
struct ChoiceDef {
    prefix: &'static str,
    variants: &'static [&'static str],
}

pub struct StaticTypeRegistry {
    elements: HashMap<(&'static str, &'static str), ElementDef>,
    choices: HashMap<&'static str, Vec<ChoiceDef>>,
    canonical_aliases: HashMap<&'static str, &'static str>,
    discriminators: HashMap<&'static str, &'static [&'static str]>,
    primitives: Vec<&'static str>,
    complex_types: Vec<&'static str>,
    resources: Vec<&'static str>,
}

const PRIMITIVES: &[&str] = &[
    "string", "integer", "decimal", "boolean", "date", "dateTime", "time", "instant",
    "code", "id", "uri", "url", "canonical", "base64Binary", "markdown", "unsignedInt",
    "positiveInt", "xhtml",
];

const COMPLEX_TYPES: &[&str] = &[
    "HumanName", "Address", "Quantity", "Period", "Range", "Ratio", "CodeableConcept",
    "Coding", "Identifier", "ContactPoint", "Attachment", "Annotation", "Meta",
    "Narrative", "Extension", "Reference", "Dosage", "SampledData", "Timing",
    "BackboneElement", "Element",
];

const RESOURCES: &[&str] = &[
    "Patient", "Observation", "Encounter", "Condition", "Procedure",
    "MedicationRequest", "Medication", "Organization", "Practitioner", "Location",
];

/// Profile aliases collapsing to a canonical type (spec §3, §4.5).
const PROFILE_ALIASES: &[(&str, &str)] = &[
    ("Age", "Quantity"),
    ("Duration", "Quantity"),
    ("Count", "Quantity"),
    ("Distance", "Quantity"),
    ("System.Boolean", "boolean"),
    ("System.String", "string"),
    ("System.Integer", "integer"),
    ("System.Decimal", "decimal"),
];

/// Discriminator fields per spec §4.5 ("Discriminator field").
const DISCRIMINATORS: &[(&str, &[&str])] = &[
    ("Quantity", &["value"]),
    ("CodeableConcept", &["coding"]),
    ("Range", &["low"]),
    ("Ratio", &["numerator", "denominator"]),
    ("Period", &["start"]),
];

impl Default for StaticTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticTypeRegistry {
    pub fn new() -> Self {
        let mut elements = HashMap::new();
        let mut choices: HashMap<&'static str, Vec<ChoiceDef>> = HashMap::new();

        macro_rules! elem {
            ($elements:ident, $type_name:expr, $element:expr, $fhir_type:expr) => {
                $elements.insert(
                    ($type_name, $element),
                    ElementDef { fhir_type: $fhir_type, is_array: false },
                );
            };
        }
        macro_rules! elem_array {
            ($elements:ident, $type_name:expr, $element:expr, $fhir_type:expr) => {
                $elements.insert(
                    ($type_name, $element),
                    ElementDef { fhir_type: $fhir_type, is_array: true },
                );
            };
        }

        // Patient
        elem!(elements, "Patient", "birthDate", "date");
        elem!(elements, "Patient", "deceasedBoolean", "boolean");
        elem!(elements, "Patient", "deceasedDateTime", "dateTime");
        elem!(elements, "Patient", "multipleBirthBoolean", "boolean");
        elem!(elements, "Patient", "multipleBirthInteger", "integer");
        elem!(elements, "Patient", "active", "boolean");
        elem!(elements, "Patient", "gender", "code");
        elem_array!(elements, "Patient", "name", "HumanName");
        elem_array!(elements, "Patient", "telecom", "ContactPoint");
        elem_array!(elements, "Patient", "address", "Address");
        elem!(elements, "Patient", "maritalStatus", "CodeableConcept");
        elem_array!(elements, "Patient", "contact", "BackboneElement");
        elem_array!(elements, "Patient", "communication", "BackboneElement");
        elem_array!(elements, "Patient", "generalPractitioner", "Reference");
        elem!(elements, "Patient", "managingOrganization", "Reference");
        elem_array!(elements, "Patient", "link", "BackboneElement");
        elem_array!(elements, "Patient", "identifier", "Identifier");
        elem_array!(elements, "Patient", "photo", "Attachment");
        choices.entry("Patient").or_default().push(ChoiceDef {
            prefix: "deceased",
            variants: &["Boolean", "DateTime"],
        });
        choices.entry("Patient").or_default().push(ChoiceDef {
            prefix: "multipleBirth",
            variants: &["Boolean", "Integer"],
        });

        // Observation
        elem!(elements, "Observation", "valueQuantity", "Quantity");
        elem!(elements, "Observation", "valueCodeableConcept", "CodeableConcept");
        elem!(elements, "Observation", "valueString", "string");
        elem!(elements, "Observation", "valueBoolean", "boolean");
        elem!(elements, "Observation", "valueInteger", "integer");
        elem!(elements, "Observation", "valueRange", "Range");
        elem!(elements, "Observation", "valueRatio", "Ratio");
        elem!(elements, "Observation", "valueSampledData", "SampledData");
        elem!(elements, "Observation", "valueTime", "time");
        elem!(elements, "Observation", "valueDateTime", "dateTime");
        elem!(elements, "Observation", "valuePeriod", "Period");
        elem!(elements, "Observation", "effectiveDateTime", "dateTime");
        elem!(elements, "Observation", "effectivePeriod", "Period");
        elem!(elements, "Observation", "effectiveTiming", "Timing");
        elem!(elements, "Observation", "effectiveInstant", "instant");
        elem!(elements, "Observation", "issued", "instant");
        elem!(elements, "Observation", "status", "code");
        elem_array!(elements, "Observation", "category", "CodeableConcept");
        elem!(elements, "Observation", "code", "CodeableConcept");
        elem!(elements, "Observation", "subject", "Reference");
        elem!(elements, "Observation", "encounter", "Reference");
        elem_array!(elements, "Observation", "performer", "Reference");
        elem_array!(elements, "Observation", "interpretation", "CodeableConcept");
        elem_array!(elements, "Observation", "note", "Annotation");
        elem!(elements, "Observation", "bodySite", "CodeableConcept");
        elem!(elements, "Observation", "method", "CodeableConcept");
        elem_array!(elements, "Observation", "referenceRange", "BackboneElement");
        elem_array!(elements, "Observation", "component", "BackboneElement");
        choices.entry("Observation").or_default().push(ChoiceDef {
            prefix: "value",
            variants: &[
                "Quantity", "CodeableConcept", "String", "Boolean", "Integer", "Range",
                "Ratio", "SampledData", "Time", "DateTime", "Period",
            ],
        });
        choices.entry("Observation").or_default().push(ChoiceDef {
            prefix: "effective",
            variants: &["DateTime", "Period", "Timing", "Instant"],
        });

        // Encounter
        elem!(elements, "Encounter", "status", "code");
        elem!(elements, "Encounter", "class", "Coding");
        elem_array!(elements, "Encounter", "type", "CodeableConcept");
        elem!(elements, "Encounter", "priority", "CodeableConcept");
        elem!(elements, "Encounter", "subject", "Reference");
        elem!(elements, "Encounter", "period", "Period");
        elem!(elements, "Encounter", "length", "Duration");
        elem_array!(elements, "Encounter", "reasonCode", "CodeableConcept");
        elem_array!(elements, "Encounter", "diagnosis", "BackboneElement");
        elem!(elements, "Encounter", "hospitalization", "BackboneElement");
        elem_array!(elements, "Encounter", "location", "BackboneElement");

        // Condition
        elem!(elements, "Condition", "clinicalStatus", "CodeableConcept");
        elem!(elements, "Condition", "verificationStatus", "CodeableConcept");
        elem_array!(elements, "Condition", "category", "CodeableConcept");
        elem!(elements, "Condition", "severity", "CodeableConcept");
        elem!(elements, "Condition", "code", "CodeableConcept");
        elem_array!(elements, "Condition", "bodySite", "CodeableConcept");
        elem!(elements, "Condition", "subject", "Reference");
        elem!(elements, "Condition", "encounter", "Reference");
        elem!(elements, "Condition", "onsetDateTime", "dateTime");
        elem!(elements, "Condition", "onsetAge", "Age");
        elem!(elements, "Condition", "onsetPeriod", "Period");
        elem!(elements, "Condition", "onsetRange", "Range");
        elem!(elements, "Condition", "onsetString", "string");
        elem!(elements, "Condition", "abatementDateTime", "dateTime");
        elem!(elements, "Condition", "abatementAge", "Age");
        elem!(elements, "Condition", "abatementPeriod", "Period");
        elem!(elements, "Condition", "abatementRange", "Range");
        elem!(elements, "Condition", "abatementString", "string");
        elem!(elements, "Condition", "recordedDate", "dateTime");
        choices.entry("Condition").or_default().push(ChoiceDef {
            prefix: "onset",
            variants: &["DateTime", "Age", "Period", "Range", "String"],
        });
        choices.entry("Condition").or_default().push(ChoiceDef {
            prefix: "abatement",
            variants: &["DateTime", "Age", "Period", "Range", "String"],
        });

        // Procedure
        elem!(elements, "Procedure", "status", "code");
        elem!(elements, "Procedure", "code", "CodeableConcept");
        elem!(elements, "Procedure", "subject", "Reference");
        elem!(elements, "Procedure", "encounter", "Reference");
        elem!(elements, "Procedure", "performedDateTime", "dateTime");
        elem!(elements, "Procedure", "performedPeriod", "Period");
        elem!(elements, "Procedure", "performedString", "string");
        elem!(elements, "Procedure", "performedAge", "Age");
        elem!(elements, "Procedure", "performedRange", "Range");
        elem!(elements, "Procedure", "recorder", "Reference");
        elem!(elements, "Procedure", "asserter", "Reference");
        elem_array!(elements, "Procedure", "performer", "BackboneElement");
        elem!(elements, "Procedure", "location", "Reference");
        elem_array!(elements, "Procedure", "reasonCode", "CodeableConcept");
        elem_array!(elements, "Procedure", "bodySite", "CodeableConcept");
        elem!(elements, "Procedure", "outcome", "CodeableConcept");
        elem_array!(elements, "Procedure", "complication", "CodeableConcept");
        choices.entry("Procedure").or_default().push(ChoiceDef {
            prefix: "performed",
            variants: &["DateTime", "Period", "String", "Age", "Range"],
        });

        // MedicationRequest
        elem!(elements, "MedicationRequest", "status", "code");
        elem!(elements, "MedicationRequest", "intent", "code");
        elem!(elements, "MedicationRequest", "medicationCodeableConcept", "CodeableConcept");
        elem!(elements, "MedicationRequest", "medicationReference", "Reference");
        elem!(elements, "MedicationRequest", "subject", "Reference");
        elem!(elements, "MedicationRequest", "encounter", "Reference");
        elem!(elements, "MedicationRequest", "authoredOn", "dateTime");
        elem!(elements, "MedicationRequest", "requester", "Reference");
        elem!(elements, "MedicationRequest", "performer", "Reference");
        elem_array!(elements, "MedicationRequest", "reasonCode", "CodeableConcept");
        elem_array!(elements, "MedicationRequest", "dosageInstruction", "Dosage");
        elem!(elements, "MedicationRequest", "dispenseRequest", "BackboneElement");
        choices.entry("MedicationRequest").or_default().push(ChoiceDef {
            prefix: "medication",
            variants: &["CodeableConcept", "Reference"],
        });

        // Common elements across every resource type.
        let common: &[(&str, &str)] = &[
            ("id", "id"),
            ("meta", "Meta"),
            ("implicitRules", "uri"),
            ("language", "code"),
            ("text", "Narrative"),
            ("extension", "Extension"),
            ("modifierExtension", "Extension"),
        ];
        for resource in RESOURCES {
            for (name, fhir_type) in common {
                elements.insert(
                    (*resource, *name),
                    ElementDef { fhir_type, is_array: *name == "extension" || *name == "modifierExtension" },
                );
            }
            elements.insert((*resource, "contained"), ElementDef { fhir_type: "Resource", is_array: true });
        }

        // Complex type element shapes needed for navigation past the first
        // path segment (HumanName.given, Period.start, Quantity.value, ...).
        elem_array!(elements, "HumanName", "given", "string");
        elem!(elements, "HumanName", "family", "string");
        elem!(elements, "HumanName", "use", "code");
        elem!(elements, "HumanName", "text", "string");
        elem_array!(elements, "HumanName", "prefix", "string");
        elem_array!(elements, "HumanName", "suffix", "string");

        elem_array!(elements, "Address", "line", "string");
        elem!(elements, "Address", "city", "string");
        elem!(elements, "Address", "state", "string");
        elem!(elements, "Address", "postalCode", "string");
        elem!(elements, "Address", "country", "string");
        elem!(elements, "Address", "use", "code");

        elem!(elements, "Period", "start", "dateTime");
        elem!(elements, "Period", "end", "dateTime");

        elem!(elements, "Quantity", "value", "decimal");
        elem!(elements, "Quantity", "unit", "string");
        elem!(elements, "Quantity", "system", "uri");
        elem!(elements, "Quantity", "code", "code");
        elem!(elements, "Quantity", "comparator", "code");

        elem!(elements, "Range", "low", "Quantity");
        elem!(elements, "Range", "high", "Quantity");

        elem!(elements, "Ratio", "numerator", "Quantity");
        elem!(elements, "Ratio", "denominator", "Quantity");

        elem_array!(elements, "CodeableConcept", "coding", "Coding");
        elem!(elements, "CodeableConcept", "text", "string");

        elem!(elements, "Coding", "system", "uri");
        elem!(elements, "Coding", "version", "string");
        elem!(elements, "Coding", "code", "code");
        elem!(elements, "Coding", "display", "string");

        elem!(elements, "Identifier", "system", "uri");
        elem!(elements, "Identifier", "value", "string");
        elem!(elements, "Identifier", "use", "code");
        elem!(elements, "Identifier", "type", "CodeableConcept");

        elem!(elements, "ContactPoint", "system", "code");
        elem!(elements, "ContactPoint", "value", "string");
        elem!(elements, "ContactPoint", "use", "code");

        elem!(elements, "Reference", "reference", "string");
        elem!(elements, "Reference", "type", "uri");
        elem!(elements, "Reference", "display", "string");

        let canonical_aliases = PROFILE_ALIASES.iter().copied().collect();
        let discriminators = DISCRIMINATORS.iter().copied().collect();

        Self {
            elements,
            choices,
            canonical_aliases,
            discriminators,
            primitives: PRIMITIVES.to_vec(),
            complex_types: COMPLEX_TYPES.to_vec(),
            resources: RESOURCES.to_vec(),
        }
    }

    fn choice_prefix_for(&self, type_name: &str, element: &str) -> Option<&ChoiceDef> {
        self.choices
            .get(type_name)
            .and_then(|defs| defs.iter().find(|def| def.prefix == element))
    }
}

impl TypeRegistry for StaticTypeRegistry {
    fn is_registered_type(&self, name: &str) -> bool {
        let canonical = self.get_canonical_name(name);
        self.primitives.contains(&canonical.as_str())
            || self.complex_types.contains(&canonical.as_str())
            || self.resources.contains(&canonical.as_str())
    }

    fn get_canonical_name(&self, name: &str) -> String {
        self.canonical_aliases.get(name).map(|s| s.to_string()).unwrap_or_else(|| name.to_string())
    }

    fn get_element_type(&self, type_name: &str, element: &str) -> Option<String> {
        let canonical = self.get_canonical_name(type_name);
        self.elements
            .get(&(canonical.as_str(), element))
            .map(|def| def.fhir_type.to_string())
    }

    fn get_element_names(&self, type_name: &str) -> Vec<String> {
        let canonical = self.get_canonical_name(type_name);
        let mut names: Vec<String> = self
            .elements
            .keys()
            .filter(|(t, _)| *t == canonical.as_str())
            .map(|(_, element)| element.to_string())
            .collect();

        if let Some(defs) = self.choices.get(canonical.as_str()) {
            for def in defs {
                names.push(format!("{}[x]", def.prefix));
            }
        }

        names.sort();
        names.dedup();
        names
    }

    fn is_array_element(&self, type_name: &str, element: &str) -> bool {
        let canonical = self.get_canonical_name(type_name);
        self.elements
            .get(&(canonical.as_str(), element))
            .map(|def| def.is_array)
            .unwrap_or(false)
    }

    fn get_all_type_names(&self) -> Vec<String> {
        self.primitives
            .iter()
            .chain(self.complex_types.iter())
            .chain(self.resources.iter())
            .map(|s| s.to_string())
            .collect()
    }

    fn discriminator_fields(&self, type_name: &str) -> Option<Vec<String>> {
        let canonical = self.get_canonical_name(type_name);
        self.discriminators
            .get(canonical.as_str())
            .map(|fields| fields.iter().map(|s| s.to_string()).collect())
    }

    fn choice_type_variants(&self, type_name: &str, prefix: &str) -> Vec<String> {
        let canonical = self.get_canonical_name(type_name);
        self.choice_prefix_for(canonical.as_str(), prefix)
            .map(|def| def.variants.iter().map(|suffix| format!("{prefix}{suffix}")).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_scalar_and_array_elements() {
        let registry = StaticTypeRegistry::new();
        assert_eq!(registry.get_element_type("Patient", "birthDate"), Some("date".to_string()));
        assert!(registry.is_array_element("Patient", "name"));
        assert!(!registry.is_array_element("Patient", "birthDate"));
    }

    #[test]
    fn canonicalizes_profile_aliases() {
        let registry = StaticTypeRegistry::new();
        assert_eq!(registry.get_canonical_name("Age"), "Quantity");
        assert_eq!(registry.get_canonical_name("System.Boolean"), "boolean");
    }

    #[test]
    fn expands_choice_type_variants() {
        let registry = StaticTypeRegistry::new();
        let variants = registry.choice_type_variants("Observation", "value");
        assert!(variants.contains(&"valueQuantity".to_string()));
        assert!(variants.contains(&"valueBoolean".to_string()));
    }

    #[test]
    fn discriminator_fields_for_quantity() {
        let registry = StaticTypeRegistry::new();
        assert_eq!(registry.discriminator_fields("Quantity"), Some(vec!["value".to_string()]));
    }

    #[test]
    fn falls_back_to_first_component_like_original_resolver() {
        // Mirrors FHIRElementTypeResolver's two-step fallback: a nested path
        // like "name.given" resolves via the first component ("name").
        let registry = StaticTypeRegistry::new();
        assert_eq!(registry.get_element_type("Patient", "name"), Some("HumanName".to_string()));
        assert_eq!(registry.get_element_type("HumanName", "given"), Some("string".to_string()));
    }

    #[test]
    fn choice_placeholder_appears_in_element_names() {
        let registry = StaticTypeRegistry::new();
        let names = registry.get_element_names("Observation");
        assert!(names.contains(&"value[x]".to_string()));
    }
}
