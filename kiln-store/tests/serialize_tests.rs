use kiln_model::{Entity, FieldDecl, FieldValue, SharedEntity, TypeRegistry};
use kiln_store::{
    deserialize, deserialize_into, form_id, form_type, serialize, serialize_graph, EntryMap,
    StoreError,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::rc::Rc;

fn registry() -> TypeRegistry {
    let mut reg = TypeRegistry::new();
    reg.declare("scene", FieldDecl::primitive("name"));
    reg.declare("scene", FieldDecl::entity_ref("lead", "item"));
    reg.declare("scene", FieldDecl::ordered_list("items", "item"));
    reg.declare("scene", FieldDecl::keyed_map("slots", "item"));
    reg.declare("item", FieldDecl::primitive("label"));
    reg.declare("item", FieldDecl::entity_ref("peer", "item"));
    reg.declare("sprite", FieldDecl::primitive("label"));
    reg
}

fn item(label: &str) -> SharedEntity {
    let mut e = Entity::new("item", None);
    e.set_field("label", FieldValue::Primitive(json!(label)));
    e.into_shared()
}

// ── shallow serialization ─────────────────────────────────────────

#[test]
fn shallow_form_carries_id_and_type() {
    let reg = registry();
    let entity = item("a");
    let form = serialize(&reg, &entity.borrow());
    assert_eq!(form_id(&form).unwrap(), entity.borrow().id());
    assert_eq!(form_type(&form), Some("item"));
    assert_eq!(form["label"], json!("a"));
}

#[test]
fn shallow_ref_is_a_bare_id_string() {
    let reg = registry();
    let child = item("c");
    let mut scene = Entity::new("scene", None);
    scene.set_field("lead", FieldValue::Ref(Some(child.clone())));
    let form = serialize(&reg, &scene);
    assert_eq!(form["lead"], json!(child.borrow().id().to_string()));
}

#[test]
fn shallow_skips_undeclared_and_transient_fields() {
    let reg = registry();
    let mut e = Entity::new("item", None);
    e.set_field("label", FieldValue::Primitive(json!("x")));
    e.set_field("off_the_books", FieldValue::Primitive(json!(1)));
    e.set_transient("hover", FieldValue::Primitive(json!(true)));
    let form = serialize(&reg, &e);
    assert!(form.get("off_the_books").is_none());
    assert!(form.get("hover").is_none());
}

#[test]
fn empty_ref_serializes_as_null() {
    let reg = registry();
    let mut scene = Entity::new("scene", None);
    scene.set_field("lead", FieldValue::Ref(None));
    let form = serialize(&reg, &scene);
    assert_eq!(form["lead"], Value::Null);
}

#[test]
fn unset_declared_field_is_omitted() {
    let reg = registry();
    let e = Entity::new("item", None);
    let form = serialize(&reg, &e);
    assert!(form.get("label").is_none());
}

// ── recursive serialization ───────────────────────────────────────

#[test]
fn recursive_registers_children_in_entries() {
    let reg = registry();
    let child = item("c");
    let mut scene = Entity::new("scene", None);
    scene.set_field("lead", FieldValue::Ref(Some(child.clone())));
    let scene = scene.into_shared();

    let mut entries = EntryMap::new();
    let form = serialize_graph(&reg, &scene, &mut entries);

    assert_eq!(form["lead"], json!(child.borrow().id().to_string()));
    assert_eq!(entries.len(), 2);
    let child_entry = &entries[&child.borrow().id()];
    assert_eq!(child_entry.serialized.as_ref().unwrap()["label"], json!("c"));
    assert!(Rc::ptr_eq(child_entry.instance.as_ref().unwrap(), &child));
}

#[test]
fn shared_reference_is_inlined_exactly_once() {
    let reg = registry();
    let shared = item("shared");
    let a = {
        let mut e = Entity::new("item", None);
        e.set_field("peer", FieldValue::Ref(Some(shared.clone())));
        e.into_shared()
    };
    let b = {
        let mut e = Entity::new("item", None);
        e.set_field("peer", FieldValue::Ref(Some(shared.clone())));
        e.into_shared()
    };
    let mut scene = Entity::new("scene", None);
    scene.set_field("items", FieldValue::List(vec![a.clone(), b.clone()]));
    let scene = scene.into_shared();

    let mut entries = EntryMap::new();
    serialize_graph(&reg, &scene, &mut entries);

    // One inlined copy of the shared entity, two id references to it.
    assert_eq!(entries.len(), 4);
    let shared_id = json!(shared.borrow().id().to_string());
    assert_eq!(entries[&a.borrow().id()].serialized.as_ref().unwrap()["peer"], shared_id);
    assert_eq!(entries[&b.borrow().id()].serialized.as_ref().unwrap()["peer"], shared_id);
}

#[test]
fn cyclic_graph_terminates_with_each_id_once() {
    let reg = registry();
    let a = item("a");
    let b = item("b");
    a.borrow_mut().set_field("peer", FieldValue::Ref(Some(b.clone())));
    b.borrow_mut().set_field("peer", FieldValue::Ref(Some(a.clone())));

    let mut entries = EntryMap::new();
    let form = serialize_graph(&reg, &a, &mut entries);

    assert_eq!(entries.len(), 2);
    assert_eq!(form["peer"], json!(b.borrow().id().to_string()));
    let b_form = entries[&b.borrow().id()].serialized.as_ref().unwrap();
    assert_eq!(b_form["peer"], json!(a.borrow().id().to_string()));
}

#[test]
fn list_order_and_map_keys_are_preserved() {
    let reg = registry();
    let first = item("first");
    let second = item("second");
    let keyed = item("keyed");
    let mut scene = Entity::new("scene", None);
    scene.set_field("items", FieldValue::List(vec![first.clone(), second.clone()]));
    scene.set_field(
        "slots",
        FieldValue::Map([("north".to_string(), keyed.clone())].into()),
    );
    let scene = scene.into_shared();

    let mut entries = EntryMap::new();
    let form = serialize_graph(&reg, &scene, &mut entries);

    assert_eq!(
        form["items"],
        json!([
            first.borrow().id().to_string(),
            second.borrow().id().to_string()
        ])
    );
    assert_eq!(form["slots"]["north"], json!(keyed.borrow().id().to_string()));
}

// ── deserialization ───────────────────────────────────────────────

#[test]
fn round_trip_restores_declared_fields() {
    let reg = registry();
    let child = item("c");
    let mut scene = Entity::new("scene", None);
    scene.set_field("name", FieldValue::Primitive(json!("main")));
    scene.set_field("lead", FieldValue::Ref(Some(child.clone())));
    scene.set_field("items", FieldValue::List(vec![child.clone()]));
    let scene = scene.into_shared();

    let mut entries = EntryMap::new();
    let form = serialize_graph(&reg, &scene, &mut entries);

    // Rehydrate into a fresh world (forms only, no instances).
    let mut fresh = EntryMap::new();
    for (id, entry) in &entries {
        fresh.insert(
            *id,
            kiln_store::Entry {
                serialized: entry.serialized.clone(),
                instance: None,
            },
        );
    }
    let restored = deserialize(&reg, &form, "scene", &mut fresh, true).unwrap();

    let reserialized = serialize_graph(&reg, &restored, &mut EntryMap::new());
    let original = serialize_graph(&reg, &scene, &mut EntryMap::new());
    assert_eq!(reserialized, original);
}

#[test]
fn deserialize_preserves_identity_across_repeated_calls() {
    let reg = registry();
    let entity = item("a");
    let mut entries = EntryMap::new();
    let form = serialize_graph(&reg, &entity, &mut entries);

    let first = deserialize(&reg, &form, "item", &mut entries, true).unwrap();
    let second = deserialize(&reg, &form, "item", &mut entries, true).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    // The live instance in entries is returned unchanged.
    assert!(Rc::ptr_eq(&first, &entity));
}

#[test]
fn shared_reference_deserializes_to_same_instance() {
    let reg = registry();
    let shared = item("shared");
    let a = {
        let mut e = Entity::new("item", None);
        e.set_field("peer", FieldValue::Ref(Some(shared.clone())));
        e.into_shared()
    };
    let b = {
        let mut e = Entity::new("item", None);
        e.set_field("peer", FieldValue::Ref(Some(shared.clone())));
        e.into_shared()
    };
    let mut scene = Entity::new("scene", None);
    scene.set_field("items", FieldValue::List(vec![a.clone(), b]));
    let scene = scene.into_shared();

    let mut entries = EntryMap::new();
    let form = serialize_graph(&reg, &scene, &mut entries);

    let mut fresh = EntryMap::new();
    for (id, entry) in &entries {
        fresh.insert(
            *id,
            kiln_store::Entry {
                serialized: entry.serialized.clone(),
                instance: None,
            },
        );
    }
    let restored = deserialize(&reg, &form, "scene", &mut fresh, true).unwrap();
    let scene_ref = restored.borrow();
    let items = scene_ref.field("items").unwrap().as_list().unwrap().to_vec();
    let peer_a = items[0].borrow().field("peer").unwrap().as_entity().unwrap().clone();
    let peer_b = items[1].borrow().field("peer").unwrap().as_entity().unwrap().clone();
    assert!(Rc::ptr_eq(&peer_a, &peer_b));
}

#[test]
fn cyclic_graph_rehydrates() {
    let reg = registry();
    let a = item("a");
    let b = item("b");
    a.borrow_mut().set_field("peer", FieldValue::Ref(Some(b.clone())));
    b.borrow_mut().set_field("peer", FieldValue::Ref(Some(a.clone())));

    let mut entries = EntryMap::new();
    let form = serialize_graph(&reg, &a, &mut entries);

    let mut fresh = EntryMap::new();
    for (id, entry) in &entries {
        fresh.insert(
            *id,
            kiln_store::Entry {
                serialized: entry.serialized.clone(),
                instance: None,
            },
        );
    }
    let restored_a = deserialize(&reg, &form, "item", &mut fresh, true).unwrap();
    let restored_b = restored_a.borrow().field("peer").unwrap().as_entity().unwrap().clone();
    let back = restored_b.borrow().field("peer").unwrap().as_entity().unwrap().clone();
    assert!(Rc::ptr_eq(&back, &restored_a));
}

#[test]
fn type_tag_wins_over_expected_type() {
    let reg = registry();
    let sprite = {
        let mut e = Entity::new("sprite", None);
        e.set_field("label", FieldValue::Primitive(json!("s")));
        e.into_shared()
    };
    let form = serialize(&reg, &sprite.borrow());
    let restored = deserialize(&reg, &form, "item", &mut EntryMap::new(), true).unwrap();
    assert_eq!(restored.borrow().type_name(), "sprite");
}

#[test]
fn unregistered_type_tag_falls_back_to_expected() {
    let reg = registry();
    let id = kiln_types::EntityId::new();
    let form = json!({ "id": id.to_string(), "type": "unknown", "label": "x" });
    let restored = deserialize(&reg, &form, "item", &mut EntryMap::new(), true).unwrap();
    assert_eq!(restored.borrow().type_name(), "item");
    assert_eq!(
        restored.borrow().field("label").and_then(FieldValue::as_primitive),
        Some(&json!("x"))
    );
}

#[test]
fn missing_id_is_rejected() {
    let reg = registry();
    let form = json!({ "type": "item", "label": "x" });
    let err = deserialize(&reg, &form, "item", &mut EntryMap::new(), true).unwrap_err();
    assert!(matches!(err, StoreError::MissingIdentity));
}

#[test]
fn unresolved_reference_degrades_to_none() {
    let reg = registry();
    let id = kiln_types::EntityId::new();
    let dangling = kiln_types::EntityId::new();
    let form = json!({
        "id": id.to_string(),
        "type": "item",
        "peer": dangling.to_string(),
    });
    let restored = deserialize(&reg, &form, "item", &mut EntryMap::new(), true).unwrap();
    assert!(restored.borrow().field("peer").unwrap().as_entity().is_none());
}

#[test]
fn inline_object_reference_resolves() {
    let reg = registry();
    let outer = kiln_types::EntityId::new();
    let inner = kiln_types::EntityId::new();
    let form = json!({
        "id": outer.to_string(),
        "type": "item",
        "peer": { "id": inner.to_string(), "type": "item", "label": "nested" },
    });
    let restored = deserialize(&reg, &form, "item", &mut EntryMap::new(), true).unwrap();
    let peer = restored.borrow().field("peer").unwrap().as_entity().unwrap().clone();
    assert_eq!(peer.borrow().id(), inner);
    assert_eq!(
        peer.borrow().field("label").and_then(FieldValue::as_primitive),
        Some(&json!("nested"))
    );
}

// ── non-recursive restoration ─────────────────────────────────────

#[test]
fn non_recursive_preserves_matching_sub_entity() {
    let reg = registry();
    let child = item("c");
    let scene = {
        let mut e = Entity::new("scene", None);
        e.set_field("lead", FieldValue::Ref(Some(child.clone())));
        e.into_shared()
    };
    let form = serialize(&reg, &scene.borrow());

    let mut entries = EntryMap::new();
    deserialize_into(&reg, &form, &scene, &mut entries, false).unwrap();
    let kept = scene.borrow().field("lead").unwrap().as_entity().unwrap().clone();
    assert!(Rc::ptr_eq(&kept, &child));
}

#[test]
fn non_recursive_collapses_mismatched_sub_entity() {
    let reg = registry();
    let old_child = item("old");
    let scene = {
        let mut e = Entity::new("scene", None);
        e.set_field("lead", FieldValue::Ref(Some(old_child)));
        e.into_shared()
    };

    // Incoming form points at a different entity.
    let other = kiln_types::EntityId::new();
    let mut form = serialize(&reg, &scene.borrow());
    form["lead"] = json!(other.to_string());

    deserialize_into(&reg, &form, &scene, &mut EntryMap::new(), false).unwrap();
    assert!(scene.borrow().field("lead").unwrap().as_entity().is_none());
}

#[test]
fn non_recursive_keeps_matching_list_elements() {
    let reg = registry();
    let keep = item("keep");
    let drop_ = item("drop");
    let scene = {
        let mut e = Entity::new("scene", None);
        e.set_field("items", FieldValue::List(vec![keep.clone(), drop_.clone()]));
        e.into_shared()
    };

    // Incoming form only references the first element.
    let form = json!({
        "id": scene.borrow().id().to_string(),
        "type": "scene",
        "items": [keep.borrow().id().to_string()],
    });

    deserialize_into(&reg, &form, &scene, &mut EntryMap::new(), false).unwrap();
    let scene_ref = scene.borrow();
    let items = scene_ref.field("items").unwrap().as_list().unwrap();
    assert_eq!(items.len(), 1);
    assert!(Rc::ptr_eq(&items[0], &keep));
}

#[test]
fn fields_absent_from_form_are_left_untouched() {
    let reg = registry();
    let entity = item("before");
    let form = json!({ "id": entity.borrow().id().to_string(), "type": "item" });
    deserialize_into(&reg, &form, &entity, &mut EntryMap::new(), false).unwrap();
    assert_eq!(
        entity.borrow().field("label").and_then(FieldValue::as_primitive),
        Some(&json!("before"))
    );
}
