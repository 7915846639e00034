//! # FHIR4DS Type Registry
//!
//! Defines the read-only `TypeRegistry` contract the translator consumes
//! (spec §6) plus [`StaticTypeRegistry`], a reference in-memory
//! implementation seeded from the element tables recovered from
//! `fhir4ds/main/fhirpath/types/element_type_resolver.py`. Loading real
//! StructureDefinitions into a registry is explicitly out of scope (spec
//! §1) — this crate exists so the compiler can be exercised and tested
//! without that external collaborator.

mod static_registry;

pub use static_registry::StaticTypeRegistry;

/// Immutable lookup the translator consumes by reference (spec §2.2, §6).
///
/// Implementations must be safe for shared immutable access across threads
/// (spec §5): the compiler may be invoked concurrently from multiple
/// threads, each with its own `TranslationContext`, all reading the same
/// registry.
pub trait TypeRegistry: Send + Sync {
    /// Whether `name` (a canonical type name, resource name, or profile
    /// alias) is known to the registry.
    fn is_registered_type(&self, name: &str) -> bool;

    /// Collapse a profile alias to its canonical type name
    /// (`Age` -> `Quantity`, `System.Boolean` -> `boolean`). Unknown names
    /// are returned unchanged.
    fn get_canonical_name(&self, name: &str) -> String;

    /// The FHIR type of `element` on `type_name`, or `None` if `type_name`
    /// has no such element. `type_name` is canonicalized first.
    fn get_element_type(&self, type_name: &str, element: &str) -> Option<String>;

    /// All element names declared on `type_name` (including `<prefix>[x]`
    /// choice-type placeholders), for suggestion purposes and for the
    /// validator's choice-type placeholder check.
    fn get_element_names(&self, type_name: &str) -> Vec<String>;

    /// Whether `element` on `type_name` is array-valued.
    fn is_array_element(&self, type_name: &str, element: &str) -> bool;

    /// Every type name known to the registry (used to derive choice-type
    /// alias suffixes in the semantic validator).
    fn get_all_type_names(&self) -> Vec<String>;

    /// Discriminator fields required to consider a choice-type cast to
    /// `type_name` successful (`Quantity` -> `["value"]`, spec §4.5). Only
    /// meaningful for complex types that participate in `value[x]`-style
    /// choices.
    fn discriminator_fields(&self, type_name: &str) -> Option<Vec<String>>;

    /// Expand a choice-type prefix (e.g. `value` on `Observation`, where
    /// the element is declared `value[x]`) into its suffixed variant names
    /// (`valueQuantity`, `valueCodeableConcept`, ...). Empty if `prefix` is
    /// not a choice-type element of `type_name`.
    fn choice_type_variants(&self, type_name: &str, prefix: &str) -> Vec<String>;
}
