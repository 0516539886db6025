//! Benchmark for message encoding and flush throughput.
//!
//! Run with: cargo bench --package meridian_networking --bench codec_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parking_lot::RwLock;

use meridian_core::{
    AttributeKey, AttributeValue, ChangeOrigin, Component, ComponentId, ComponentSchema, ComponentTypeId,
    ConnectionId, EntityId, Scene, Vec3,
};
use meridian_networking::protocol::{ComponentData, CreateEntity, EditAttributes};
use meridian_networking::{
    decode_message, encode_message, ChannelTransport, MessageWriter, SyncManager, SyncMessage, MAX_MESSAGE_SIZE,
};

const PLACEABLE: ComponentTypeId = ComponentTypeId(20);

fn schema() -> ComponentSchema {
    ComponentSchema::new(
        "Placeable",
        vec![
            ("position", AttributeValue::Float3(Vec3::new(0.0, 0.0, 0.0))),
            ("speed", AttributeValue::Real(0.0)),
            ("health", AttributeValue::Int(100)),
            ("name", AttributeValue::String("entity".to_owned())),
        ],
    )
}

fn create_message() -> SyncMessage {
    let mut registry = meridian_core::ComponentRegistry::new();
    registry.register(PLACEABLE, schema());
    let components = (1..=8u32)
        .map(|i| {
            let mut component: Component = registry.instantiate(PLACEABLE, ComponentId(i)).unwrap();
            component
                .insert_dynamic(0, meridian_core::Attribute::new("tag", AttributeValue::UInt(i)))
                .unwrap();
            ComponentData::from_component(&component)
        })
        .collect();
    SyncMessage::CreateEntity(CreateEntity {
        entity: EntityId(4242),
        components,
    })
}

fn edit_message() -> SyncMessage {
    SyncMessage::EditAttributes(EditAttributes {
        entity: EntityId(4242),
        component: ComponentId(3),
        static_edits: vec![
            (0, AttributeValue::Float3(Vec3::new(1.0, 2.0, 3.0))),
            (2, AttributeValue::Int(57)),
        ],
        dynamic_edits: vec![(0, AttributeValue::UInt(9))],
    })
}

fn benchmark_encode(c: &mut Criterion) {
    let create = create_message();
    let edit = edit_message();
    let mut writer = MessageWriter::new(MAX_MESSAGE_SIZE);

    c.bench_function("encode_create_entity_8_components", |b| {
        b.iter(|| black_box(encode_message(&mut writer, black_box(&create)).unwrap()));
    });
    c.bench_function("encode_edit_attributes", |b| {
        b.iter(|| black_box(encode_message(&mut writer, black_box(&edit)).unwrap()));
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let mut writer = MessageWriter::new(MAX_MESSAGE_SIZE);
    let create = create_message();
    encode_message(&mut writer, &create).unwrap();
    let payload = writer.as_slice().to_vec();
    let id = create.id() as u8;

    c.bench_function("decode_create_entity_8_components", |b| {
        b.iter(|| black_box(decode_message(id, black_box(&payload)).unwrap()));
    });
}

fn benchmark_flush(c: &mut Criterion) {
    let mut scene = Scene::new();
    scene.registry_mut().register(PLACEABLE, schema());
    let mut targets = Vec::new();
    for _ in 0..500 {
        let entity = scene.create_entity(ChangeOrigin::Local);
        let component = scene.add_component(entity, PLACEABLE, ChangeOrigin::Local).unwrap();
        targets.push((entity, component));
    }
    let scene = Arc::new(RwLock::new(scene));

    let mut transport = ChannelTransport::new();
    let inbox = transport.open(ConnectionId(1), 1 << 20);
    let mut manager = SyncManager::server(transport);
    manager.register_scene(&scene);
    manager.on_user_connected(ConnectionId(1));
    manager.flush();
    inbox.try_iter().for_each(drop);

    c.bench_function("flush_500_edited_entities", |b| {
        let mut health = 0;
        b.iter(|| {
            health += 1;
            {
                let mut scene = scene.write();
                for (entity, component) in &targets {
                    scene
                        .set_attribute(
                            *entity,
                            *component,
                            AttributeKey::Static(2),
                            AttributeValue::Int(health),
                            ChangeOrigin::Local,
                        )
                        .unwrap();
                }
            }
            manager.flush();
            inbox.try_iter().for_each(drop);
        });
    });
}

criterion_group!(benches, benchmark_encode, benchmark_decode, benchmark_flush);
criterion_main!(benches);
