use pretty_assertions::assert_eq;
use serde_json::json;
use tether_model::{
    AttributeType, FieldAccess, ModelDefinition, ModelError, RelationshipKind, Schema,
};
use tether_types::{Record, RecordIdentity};

const DESCRIPTOR: &str = r#"{
  "models": {
    "article": {
      "attributes": {
        "title": {"type": "string"},
        "slug": {"type": "string"},
        "favoritesCount": {"type": "number"},
        "createdAt": {"type": "datetime"},
        "updatedAt": {"type": "datetime"}
      },
      "relationships": {
        "author": {"type": "hasOne", "model": "profile", "inverse": "articles"},
        "comments": {"type": "hasMany", "model": "comment"}
      }
    },
    "profile": {
      "attributes": {"username": {"type": "string"}},
      "relationships": {
        "articles": {"type": "hasMany", "model": "article", "inverse": "author"}
      }
    },
    "comment": {
      "attributes": {"body": {"type": "string"}, "createdAt": {"type": "datetime"}}
    },
    "person": {"plural": "people"}
  }
}"#;

fn schema() -> Schema {
    Schema::from_json(DESCRIPTOR).unwrap()
}

// ── Parsing ───────────────────────────────────────────────────────

#[test]
fn parses_models_attributes_and_relationships() {
    let schema = schema();
    assert_eq!(schema.version, 1);
    assert_eq!(schema.models.len(), 4);

    let article = schema.model("article").unwrap();
    assert_eq!(article.attributes["title"].attr_type, AttributeType::String);
    assert_eq!(article.attributes["favoritesCount"].attr_type, AttributeType::Number);

    let author = schema.relationship("article", "author").unwrap();
    assert_eq!(author.kind, RelationshipKind::HasOne);
    assert_eq!(author.model, "profile");
    assert_eq!(author.inverse.as_deref(), Some("articles"));
}

#[test]
fn unrecognized_attribute_type_is_any() {
    let schema = Schema::from_json(
        r#"{"models": {"note": {"attributes": {"meta": {"type": "geojson"}}}}}"#,
    )
    .unwrap();
    assert_eq!(
        schema.model("note").unwrap().attributes["meta"].attr_type,
        AttributeType::Any
    );
}

#[test]
fn dangling_relationship_model_rejected() {
    let err = Schema::from_json(
        r#"{"models": {"article": {"relationships": {"author": {"type": "hasOne", "model": "ghost"}}}}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::InvalidSchema(_)));
}

#[test]
fn malformed_json_is_invalid_schema() {
    assert!(matches!(
        Schema::from_json("{not json"),
        Err(ModelError::InvalidSchema(_))
    ));
}

#[test]
fn builder_matches_descriptor() {
    let built = Schema::new([
        (
            "profile".to_string(),
            ModelDefinition::new().attribute("username", AttributeType::String),
        ),
        (
            "article".to_string(),
            ModelDefinition::new()
                .attribute("title", AttributeType::String)
                .has_one("author", "profile"),
        ),
    ])
    .unwrap();
    assert!(built.has_model("article"));
    assert_eq!(
        built.relationship("article", "author").unwrap().kind,
        RelationshipKind::HasOne
    );
}

// ── Field visibility ──────────────────────────────────────────────

#[test]
fn attributes_are_writable_by_default() {
    let schema = schema();
    assert!(schema.is_writable("article", "title"));
    assert!(schema.is_writable("article", "createdAt"));
}

#[test]
fn read_only_attributes_apply_to_every_model() {
    let schema = schema().with_read_only_attributes(["createdAt", "updatedAt"]);
    assert!(!schema.is_writable("article", "createdAt"));
    assert!(!schema.is_writable("article", "updatedAt"));
    assert!(!schema.is_writable("comment", "createdAt"));
    assert!(schema.is_writable("comment", "body"));
    assert_eq!(
        schema.model("article").unwrap().attributes["createdAt"].access,
        FieldAccess::ReadOnly
    );
}

#[test]
fn undeclared_attribute_is_not_writable() {
    assert!(!schema().is_writable("article", "secret"));
    assert!(!schema().is_writable("ghost", "title"));
}

// ── Plural names ──────────────────────────────────────────────────

#[test]
fn pluralize_default_and_override() {
    let schema = schema();
    assert_eq!(schema.pluralize("article"), "articles");
    assert_eq!(schema.pluralize("person"), "people");
    assert_eq!(schema.singularize("people"), Some("person"));
    assert_eq!(schema.singularize("articles"), Some("article"));
    assert_eq!(schema.singularize("widgets"), None);
}

// ── Validation ────────────────────────────────────────────────────

#[test]
fn valid_record_passes() {
    let record = Record::new("article", "a1")
        .with_attribute("title", "Hello")
        .with_attribute("favoritesCount", 3)
        .with_has_one("author", Some(RecordIdentity::new("profile", "p1")))
        .with_has_many("comments", vec![RecordIdentity::new("comment", "c1")]);
    assert!(schema().validate_record(&record).is_ok());
}

#[test]
fn null_attribute_always_passes() {
    let record = Record::new("article", "a1").with_attribute("title", json!(null));
    assert!(schema().validate_record(&record).is_ok());
}

#[test]
fn unknown_model_rejected() {
    let err = schema()
        .validate_record(&Record::new("widget", "w1"))
        .unwrap_err();
    assert_eq!(err, ModelError::UnknownModel("widget".into()));
    assert!(schema()
        .validate_identity(&RecordIdentity::new("widget", "w1"))
        .is_err());
}

#[test]
fn unknown_attribute_rejected() {
    let record = Record::new("article", "a1").with_attribute("colour", "red");
    assert!(matches!(
        schema().validate_record(&record),
        Err(ModelError::UnknownAttribute { .. })
    ));
}

#[test]
fn attribute_type_mismatch_rejected() {
    let record = Record::new("article", "a1").with_attribute("favoritesCount", "many");
    let err = schema().validate_record(&record).unwrap_err();
    assert_eq!(
        err,
        ModelError::AttributeType {
            model: "article".into(),
            attribute: "favoritesCount".into(),
            expected: AttributeType::Number,
        }
    );
}

#[test]
fn relationship_target_type_checked() {
    let record = Record::new("article", "a1")
        .with_has_one("author", Some(RecordIdentity::new("comment", "c1")));
    assert!(matches!(
        schema().validate_record(&record),
        Err(ModelError::RelationshipModel { .. })
    ));
}

#[test]
fn relationship_shape_checked() {
    let record = Record::new("article", "a1")
        .with_has_many("author", vec![RecordIdentity::new("profile", "p1")]);
    assert!(matches!(
        schema().validate_record(&record),
        Err(ModelError::RelationshipShape {
            expected: RelationshipKind::HasOne,
            ..
        })
    ));
}

#[test]
fn unknown_relationship_rejected() {
    let record = Record::new("profile", "p1")
        .with_has_one("avatar", None);
    assert!(matches!(
        schema().validate_record(&record),
        Err(ModelError::UnknownRelationship { .. })
    ));
}
