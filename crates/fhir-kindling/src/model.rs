//! Resource model capability.
//!
//! The generator and the query executor never inspect FHIR definitions
//! directly. They go through [`ResourceModel`], which resolves resource type
//! names to [`TypeDescriptor`]s and turns raw field maps into typed
//! [`Resource`]s. [`SchemaRegistry`] is the implementation shipped with the
//! crate; it knows the common R4 resource types and can learn more from
//! StructureDefinition resources.

use std::collections::{BTreeSet, HashMap};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{KindlingError, Result};
use crate::id::validate_id;

/// Raw field name to value mapping of a single resource.
pub type FieldMap = Map<String, Value>;

/// Elements every resource accepts in addition to its own.
const BASE_ELEMENTS: &[&str] = &[
    "id",
    "meta",
    "implicitRules",
    "language",
    "text",
    "contained",
    "extension",
    "modifierExtension",
];

/// Validate if a string is a valid FHIR resource type name
pub fn is_valid_resource_type_name(name: &str) -> bool {
    // FHIR resource type names must start with uppercase letter and contain only letters
    !name.is_empty()
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphabetic())
}

/// Shape of a resource type as far as generation and validation care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub required: BTreeSet<String>,
    /// Declared element names. Empty means any element is accepted.
    pub elements: BTreeSet<String>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: BTreeSet::new(),
            elements: BTreeSet::new(),
        }
    }

    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Declares the resource's own elements. Base resource elements are added
    /// automatically.
    pub fn with_elements<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elements.extend(fields.into_iter().map(Into::into));
        self.elements.extend(BASE_ELEMENTS.iter().map(|e| e.to_string()));
        self
    }

    pub fn is_open(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn accepts(&self, field: &str) -> bool {
        self.is_open() || self.elements.contains(field)
    }

    /// Builds a descriptor from a StructureDefinition resource.
    ///
    /// Top-level elements are read from the snapshot, falling back to the
    /// differential. Choice elements (`value[x]`) are expanded to one element
    /// per allowed type; a required choice element is not enforced since no
    /// single field name covers it.
    pub fn from_structure_definition(definition: &Value) -> Result<Self> {
        if definition.get("resourceType").and_then(Value::as_str) != Some("StructureDefinition") {
            return Err(KindlingError::schema_validation(
                "StructureDefinition",
                "resource is not a StructureDefinition",
            ));
        }
        let name = definition
            .get("type")
            .or_else(|| definition.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                KindlingError::schema_validation("StructureDefinition", "missing 'type'")
            })?;
        if !is_valid_resource_type_name(name) {
            return Err(KindlingError::unknown_resource_type(name));
        }

        let elements = ["snapshot", "differential"]
            .iter()
            .find_map(|section| {
                definition
                    .get(section)
                    .and_then(|s| s.get("element"))
                    .and_then(Value::as_array)
            })
            .ok_or_else(|| {
                KindlingError::schema_validation(name, "StructureDefinition has no elements")
            })?;

        let mut descriptor = TypeDescriptor::new(name);
        let mut declared = Vec::new();
        for element in elements {
            let Some(path) = element.get("path").and_then(Value::as_str) else {
                continue;
            };
            let Some(child) = path.strip_prefix(name).and_then(|p| p.strip_prefix('.')) else {
                continue;
            };
            if child.contains('.') {
                continue;
            }
            let min = element.get("min").and_then(Value::as_u64).unwrap_or(0);
            if let Some(stem) = child.strip_suffix("[x]") {
                let types = element
                    .get("type")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for code in types
                    .iter()
                    .filter_map(|t| t.get("code").and_then(Value::as_str))
                {
                    declared.push(format!("{stem}{}", capitalize(code)));
                }
            } else {
                declared.push(child.to_string());
                if min > 0 {
                    descriptor.required.insert(child.to_string());
                }
            }
        }
        Ok(descriptor.with_elements(declared))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A typed FHIR resource instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    resource_type: String,
    fields: FieldMap,
}

impl Resource {
    pub(crate) fn new(resource_type: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            resource_type: resource_type.into(),
            fields,
        }
    }

    /// Parses a FHIR JSON object, taking the type from its `resourceType`.
    /// The fields are not validated against any descriptor.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(KindlingError::schema_validation(
                "Resource",
                "resource JSON must be an object",
            ));
        };
        let resource_type = match fields.remove("resourceType") {
            Some(Value::String(rt)) if is_valid_resource_type_name(&rt) => rt,
            Some(other) => return Err(KindlingError::unknown_resource_type(other.to_string())),
            None => {
                return Err(KindlingError::schema_validation(
                    "Resource",
                    "missing 'resourceType'",
                ));
            }
        };
        Ok(Self::new(resource_type, fields))
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn into_fields(self) -> FieldMap {
        self.fields
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(
            "resourceType".to_string(),
            Value::String(self.resource_type.clone()),
        );
        object.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(object)
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("resourceType", &self.resource_type)?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Resolves resource types and constructs typed resources from field maps.
pub trait ResourceModel: Send + Sync {
    fn resolve_type(&self, name: &str) -> Result<TypeDescriptor>;

    fn required_fields(&self, descriptor: &TypeDescriptor) -> BTreeSet<String> {
        descriptor.required.clone()
    }

    /// Construct a resource, failing with `SchemaValidation` if the field map
    /// does not fit the descriptor.
    fn construct(&self, descriptor: &TypeDescriptor, fields: FieldMap) -> Result<Resource>;

    fn construct_unchecked(&self, descriptor: &TypeDescriptor, mut fields: FieldMap) -> Resource {
        fields.remove("resourceType");
        Resource::new(descriptor.name.clone(), fields)
    }
}

/// In-memory registry of resource type descriptors.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl SchemaRegistry {
    /// An empty registry. Use [`SchemaRegistry::r4`] for the built-in types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with common FHIR R4 resource types.
    pub fn r4() -> Self {
        let mut registry = Self::new();
        for descriptor in r4_descriptors() {
            registry.register(descriptor);
        }
        registry
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) -> Option<TypeDescriptor> {
        tracing::debug!(resource_type = %descriptor.name, "Registered resource type");
        self.types.insert(descriptor.name.clone(), descriptor)
    }

    pub fn register_structure_definition(&mut self, definition: &Value) -> Result<()> {
        let descriptor = TypeDescriptor::from_structure_definition(definition)?;
        self.register(descriptor);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn validate(&self, descriptor: &TypeDescriptor, fields: &FieldMap) -> Result<()> {
        let name = descriptor.name.as_str();

        let missing: Vec<&str> = descriptor
            .required
            .iter()
            .filter(|f| fields.get(*f).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(KindlingError::schema_validation(
                name,
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }

        let unknown: Vec<&str> = fields
            .keys()
            .filter(|k| !descriptor.accepts(k))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(KindlingError::schema_validation(
                name,
                format!("unknown fields: {}", unknown.join(", ")),
            ));
        }

        if let Some(id) = fields.get("id") {
            let id = id.as_str().ok_or_else(|| {
                KindlingError::schema_validation(name, "'id' must be a string")
            })?;
            validate_id(id).map_err(|e| KindlingError::schema_validation(name, e.to_string()))?;
        }

        Ok(())
    }
}

impl ResourceModel for SchemaRegistry {
    fn resolve_type(&self, name: &str) -> Result<TypeDescriptor> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| KindlingError::unknown_resource_type(name))
    }

    fn construct(&self, descriptor: &TypeDescriptor, mut fields: FieldMap) -> Result<Resource> {
        if let Some(rt) = fields.remove("resourceType")
            && rt.as_str() != Some(descriptor.name.as_str())
        {
            return Err(KindlingError::schema_validation(
                &descriptor.name,
                format!("resourceType {rt} does not match"),
            ));
        }
        self.validate(descriptor, &fields)?;
        Ok(Resource::new(descriptor.name.clone(), fields))
    }
}

fn r4_descriptors() -> Vec<TypeDescriptor> {
    vec![
        TypeDescriptor::new("Patient").with_elements([
            "identifier",
            "active",
            "name",
            "telecom",
            "gender",
            "birthDate",
            "deceasedBoolean",
            "deceasedDateTime",
            "address",
            "maritalStatus",
            "multipleBirthBoolean",
            "multipleBirthInteger",
            "photo",
            "contact",
            "communication",
            "generalPractitioner",
            "managingOrganization",
            "link",
        ]),
        TypeDescriptor::new("Practitioner").with_elements([
            "identifier",
            "active",
            "name",
            "telecom",
            "address",
            "gender",
            "birthDate",
            "photo",
            "qualification",
            "communication",
        ]),
        TypeDescriptor::new("Organization").with_elements([
            "identifier",
            "active",
            "type",
            "name",
            "alias",
            "telecom",
            "address",
            "partOf",
            "contact",
            "endpoint",
        ]),
        TypeDescriptor::new("Observation")
            .with_required(["status", "code"])
            .with_elements([
                "identifier",
                "basedOn",
                "partOf",
                "status",
                "category",
                "code",
                "subject",
                "focus",
                "encounter",
                "effectiveDateTime",
                "effectivePeriod",
                "effectiveTiming",
                "effectiveInstant",
                "issued",
                "performer",
                "valueQuantity",
                "valueCodeableConcept",
                "valueString",
                "valueBoolean",
                "valueInteger",
                "valueRange",
                "valueRatio",
                "valueSampledData",
                "valueTime",
                "valueDateTime",
                "valuePeriod",
                "dataAbsentReason",
                "interpretation",
                "note",
                "bodySite",
                "method",
                "specimen",
                "device",
                "referenceRange",
                "hasMember",
                "derivedFrom",
                "component",
            ]),
        TypeDescriptor::new("Condition")
            .with_required(["subject"])
            .with_elements([
                "identifier",
                "clinicalStatus",
                "verificationStatus",
                "category",
                "severity",
                "code",
                "bodySite",
                "subject",
                "encounter",
                "onsetDateTime",
                "onsetAge",
                "onsetPeriod",
                "onsetRange",
                "onsetString",
                "abatementDateTime",
                "abatementAge",
                "abatementPeriod",
                "abatementRange",
                "abatementString",
                "recordedDate",
                "recorder",
                "asserter",
                "stage",
                "evidence",
                "note",
            ]),
        TypeDescriptor::new("Encounter")
            .with_required(["status", "class"])
            .with_elements([
                "identifier",
                "status",
                "statusHistory",
                "class",
                "classHistory",
                "type",
                "serviceType",
                "priority",
                "subject",
                "episodeOfCare",
                "basedOn",
                "participant",
                "appointment",
                "period",
                "length",
                "reasonCode",
                "reasonReference",
                "diagnosis",
                "account",
                "hospitalization",
                "location",
                "serviceProvider",
                "partOf",
            ]),
        TypeDescriptor::new("Procedure")
            .with_required(["status", "subject"])
            .with_elements([
                "identifier",
                "instantiatesCanonical",
                "instantiatesUri",
                "basedOn",
                "partOf",
                "status",
                "statusReason",
                "category",
                "code",
                "subject",
                "encounter",
                "performedDateTime",
                "performedPeriod",
                "performedString",
                "performedAge",
                "performedRange",
                "recorder",
                "asserter",
                "performer",
                "location",
                "reasonCode",
                "reasonReference",
                "bodySite",
                "outcome",
                "report",
                "complication",
                "complicationDetail",
                "followUp",
                "note",
                "focalDevice",
                "usedReference",
                "usedCode",
            ]),
        TypeDescriptor::new("MedicationRequest")
            .with_required(["status", "intent", "subject"])
            .with_elements([
                "identifier",
                "status",
                "statusReason",
                "intent",
                "category",
                "priority",
                "doNotPerform",
                "reportedBoolean",
                "reportedReference",
                "medicationCodeableConcept",
                "medicationReference",
                "subject",
                "encounter",
                "supportingInformation",
                "authoredOn",
                "requester",
                "performer",
                "performerType",
                "recorder",
                "reasonCode",
                "reasonReference",
                "instantiatesCanonical",
                "instantiatesUri",
                "basedOn",
                "groupIdentifier",
                "courseOfTherapyType",
                "insurance",
                "note",
                "dosageInstruction",
                "dispenseRequest",
                "substitution",
                "priorPrescription",
                "detectedIssue",
                "eventHistory",
            ]),
        TypeDescriptor::new("DiagnosticReport")
            .with_required(["status", "code"])
            .with_elements([
                "identifier",
                "basedOn",
                "status",
                "category",
                "code",
                "subject",
                "encounter",
                "effectiveDateTime",
                "effectivePeriod",
                "issued",
                "performer",
                "resultsInterpreter",
                "specimen",
                "result",
                "imagingStudy",
                "media",
                "conclusion",
                "conclusionCode",
                "presentedForm",
            ]),
        TypeDescriptor::new("Specimen").with_elements([
            "identifier",
            "accessionIdentifier",
            "status",
            "type",
            "subject",
            "receivedTime",
            "parent",
            "request",
            "collection",
            "processing",
            "container",
            "condition",
            "note",
        ]),
        TypeDescriptor::new("Group")
            .with_required(["type", "actual"])
            .with_elements([
                "identifier",
                "active",
                "type",
                "actual",
                "code",
                "name",
                "quantity",
                "managingEntity",
                "characteristic",
                "member",
            ]),
        TypeDescriptor::new("ResearchStudy")
            .with_required(["status"])
            .with_elements([
                "identifier",
                "title",
                "protocol",
                "partOf",
                "status",
                "primaryPurposeType",
                "phase",
                "category",
                "focus",
                "condition",
                "contact",
                "relatedArtifact",
                "keyword",
                "location",
                "description",
                "enrollment",
                "period",
                "sponsor",
                "principalInvestigator",
                "site",
                "reasonStopped",
                "note",
                "arm",
                "objective",
            ]),
        TypeDescriptor::new("Bundle")
            .with_required(["type"])
            .with_elements(["identifier", "type", "timestamp", "total", "link", "entry", "signature"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_resource_type_name_validation() {
        assert!(is_valid_resource_type_name("Patient"));
        assert!(!is_valid_resource_type_name("patient"));
        assert!(!is_valid_resource_type_name("Patient1"));
        assert!(!is_valid_resource_type_name(""));
    }

    #[test]
    fn test_resolve_known_and_unknown_types() {
        let registry = SchemaRegistry::r4();
        let observation = registry.resolve_type("Observation").unwrap();
        assert_eq!(
            registry.required_fields(&observation),
            BTreeSet::from(["code".to_string(), "status".to_string()])
        );
        assert!(matches!(
            registry.resolve_type("Unicorn"),
            Err(KindlingError::UnknownResourceType(name)) if name == "Unicorn"
        ));
    }

    #[test]
    fn test_construct_validates_required_and_unknown_fields() {
        let registry = SchemaRegistry::r4();
        let observation = registry.resolve_type("Observation").unwrap();

        let err = registry
            .construct(&observation, fields(json!({"status": "final"})))
            .unwrap_err();
        assert!(err.to_string().contains("missing required fields: code"));

        let err = registry
            .construct(
                &observation,
                fields(json!({"status": "final", "code": {}, "colour": "red"})),
            )
            .unwrap_err();
        assert!(err.to_string().contains("unknown fields: colour"));

        let ok = registry
            .construct(
                &observation,
                fields(json!({"status": "final", "code": {"text": "hr"}, "id": "obs-1"})),
            )
            .unwrap();
        assert_eq!(ok.resource_type(), "Observation");
        assert_eq!(ok.id(), Some("obs-1"));
    }

    #[test]
    fn test_construct_rejects_bad_id_and_mismatched_type() {
        let registry = SchemaRegistry::r4();
        let patient = registry.resolve_type("Patient").unwrap();
        assert!(matches!(
            registry.construct(&patient, fields(json!({"id": "not valid!"}))),
            Err(KindlingError::SchemaValidation { .. })
        ));
        assert!(
            registry
                .construct(&patient, fields(json!({"resourceType": "Observation"})))
                .is_err()
        );
        assert!(
            registry
                .construct(&patient, fields(json!({"resourceType": "Patient"})))
                .is_ok()
        );
    }

    #[test]
    fn test_construct_unchecked_skips_validation() {
        let registry = SchemaRegistry::r4();
        let patient = registry.resolve_type("Patient").unwrap();
        let resource = registry.construct_unchecked(&patient, fields(json!({"bogus": 1})));
        assert_eq!(resource.get("bogus"), Some(&json!(1)));
    }

    #[test]
    fn test_resource_serializes_with_resource_type() {
        let resource = Resource::new("Patient", fields(json!({"gender": "male"})));
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json, json!({"resourceType": "Patient", "gender": "male"}));
        assert_eq!(resource.to_json(), json);
        assert_eq!(Resource::from_json(json).unwrap(), resource);
    }

    #[test]
    fn test_descriptor_from_structure_definition() {
        let definition = json!({
            "resourceType": "StructureDefinition",
            "type": "Device",
            "snapshot": {
                "element": [
                    {"path": "Device", "min": 0},
                    {"path": "Device.status", "min": 1},
                    {"path": "Device.deviceName", "min": 0},
                    {"path": "Device.deviceName.name", "min": 1},
                    {"path": "Device.value[x]", "min": 1,
                     "type": [{"code": "string"}, {"code": "Quantity"}]}
                ]
            }
        });
        let descriptor = TypeDescriptor::from_structure_definition(&definition).unwrap();
        assert_eq!(descriptor.name, "Device");
        assert_eq!(descriptor.required, BTreeSet::from(["status".to_string()]));
        assert!(descriptor.accepts("deviceName"));
        assert!(descriptor.accepts("valueString"));
        assert!(descriptor.accepts("valueQuantity"));
        assert!(descriptor.accepts("meta"));
        assert!(!descriptor.accepts("name"));

        let mut registry = SchemaRegistry::new();
        registry.register_structure_definition(&definition).unwrap();
        assert_eq!(registry.type_names(), vec!["Device"]);
    }
}
