use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xbin::asset::{Bone, Face, FaceVertex, Mesh, Model, Vertex, Weight};
use xbin::file::{read_model, write_model};
use xbin::{decode_model, encode_model, EncodeOptions};

/// A strip of `quads` quads in one mesh, every vertex weighted to two bones.
fn strip_model(quads: usize) -> Model {
    let mut mesh = Mesh::new("strip");
    for i in 0..=quads {
        for y in [0.0, 1.0] {
            mesh.vertices.push(Vertex {
                offset:  [i as f32, y, 0.0],
                weights: vec![Weight { bone: 0, weight: 0.5 }, Weight { bone: 1, weight: 0.5 }],
            });
        }
    }
    for i in 0..quads as u32 {
        let v = i * 2;
        for corners in [[v, v + 1, v + 2], [v + 2, v + 1, v + 3]] {
            mesh.faces.push(Face {
                mesh_id:     0,
                material_id: 0,
                corners:     corners.map(FaceVertex::new),
            });
        }
    }
    Model {
        bones: vec![Bone::new("tag_origin", -1), Bone::new("j_main", 0)],
        meshes: vec![mesh],
        ..Model::default()
    }
}

fn bench_stream(c: &mut Criterion) {
    let model = strip_model(10_000);
    let options = EncodeOptions::default();
    let raw = encode_model(&model, &options).unwrap();

    c.bench_function("encode_model_20k_faces", |b| {
        b.iter(|| encode_model(black_box(&model), &options).unwrap())
    });
    c.bench_function("decode_model_20k_faces", |b| {
        b.iter(|| decode_model(black_box(&raw)).unwrap())
    });
}

fn bench_file(c: &mut Criterion) {
    let model = strip_model(10_000);
    let options = EncodeOptions::default();
    let bytes = write_model(&model, &options).unwrap();

    c.bench_function("write_model_file_image", |b| {
        b.iter(|| write_model(black_box(&model), &options).unwrap())
    });
    c.bench_function("read_model_file_image", |b| {
        b.iter(|| read_model(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, bench_stream, bench_file);
criterion_main!(benches);
