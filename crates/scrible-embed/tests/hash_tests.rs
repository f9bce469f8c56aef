use scrible_core::traits::Embedder;
use scrible_embed::HashEmbedder;

fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[tokio::test]
async fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(384);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384);
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(v1, v2);
}

#[test]
fn case_and_punctuation_do_not_matter() {
    let e = HashEmbedder::new(256);
    let a = e.embed_text("Neural networks, trained on data.");
    let b = e.embed_text("neural NETWORKS trained on data");
    assert!(dot(&a, &b) > 0.999);
}

#[test]
fn empty_text_is_zero_vector() {
    let e = HashEmbedder::new(32);
    assert!(e.embed_text("  ... ").iter().all(|&x| x == 0.0));
}

#[test]
fn shared_words_score_higher_than_disjoint() {
    let e = HashEmbedder::new(1024);
    let doc = e.embed_text("gradient descent optimizes neural network weights");
    let related = e.embed_text("how does gradient descent work");
    let unrelated = e.embed_text("recipe for sourdough bread baking");
    assert!(dot(&doc, &related) > dot(&doc, &unrelated));
}
