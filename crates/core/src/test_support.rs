use async_trait::async_trait;
use mockall::mock;
use rizz_common::Result;
use rizz_knowledge::Embedder;

mock! {
    pub TestEmbedder {}

    #[async_trait]
    impl Embedder for TestEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>>;
        fn model_name(&self) -> &str;
        fn dimension(&self) -> usize;
    }
}

const KEYWORDS: [&str; 4] = ["hiking", "cooking", "music", "travel"];

/// One axis per keyword plus a small bias so no vector is all zeros.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    KEYWORDS
        .iter()
        .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
        .chain(std::iter::once(0.1))
        .collect()
}

pub fn keyword_embedder() -> MockTestEmbedder {
    let mut embedder = MockTestEmbedder::new();
    embedder
        .expect_embed()
        .returning(|text| Ok(keyword_vector(text)));
    embedder.expect_dimension().return_const(KEYWORDS.len() + 1);
    embedder
        .expect_model_name()
        .return_const("keyword-test".to_string());
    embedder
}
