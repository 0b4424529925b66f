use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance, FieldType,
    Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use uuid::Uuid;

use crate::gemini_client::{GeminiClient, GeminiError, EMBEDDING_DIMENSION};

const COLLECTION_NAME: &str = "chat_pdf";
const SEARCH_LIMIT: u64 = 4;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Qdrant error: {0}")]
    Qdrant(#[from] QdrantError),
    #[error("Embedding error: {0}")]
    Embedding(#[from] GeminiError),
}

#[derive(Clone)]
pub struct QdrantClient {
    client: Qdrant,
    collection_name: String,
}

impl QdrantClient {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let mut client_builder = Qdrant::from_url(url);

        if let Some(key) = api_key {
            client_builder = client_builder.api_key(key);
        }

        let client = client_builder.build()?;

        Ok(Self {
            client,
            collection_name: COLLECTION_NAME.to_string(),
        })
    }

    /// Creates the chunk collection and its payload index if they are missing.
    /// Safe to call on every startup.
    pub async fn ensure_collection(&self) -> Result<(), QdrantError> {
        if !self.client.collection_exists(&self.collection_name).await? {
            tracing::info!("Creating Qdrant collection: {}", self.collection_name);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name).vectors_config(
                        VectorParamsBuilder::new(EMBEDDING_DIMENSION, Distance::Cosine),
                    ),
                )
                .await?;
        }

        // Index the document hash so per-document searches stay cheap.
        let index_result = self
            .client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(
                    &self.collection_name,
                    "pdf_id",
                    FieldType::Keyword,
                )
                .wait(true),
            )
            .await;

        match index_result {
            Ok(_) => tracing::info!("✅ Created pdf_id index"),
            Err(e) => {
                if e.to_string().contains("already exists") {
                    tracing::debug!("pdf_id index already exists, skipping");
                } else {
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Embeds every chunk and stores the vectors tagged with the document
    /// hash. Returns the number of points written.
    pub async fn upsert_chunks(
        &self,
        chunks: &[String],
        pdf_hash: &str,
        gemini: &GeminiClient,
    ) -> Result<usize, VectorStoreError> {
        let mut points = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let embedding = gemini.embed_content_with_retry(chunk).await?;

            let mut payload = Payload::new();
            payload.insert("text", chunk.as_str());
            payload.insert("pdf_id", pdf_hash);

            points.push(PointStruct::new(
                Uuid::new_v4().to_string(),
                embedding,
                payload,
            ));
        }

        let count = points.len();
        if count == 0 {
            return Ok(0);
        }
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await?;

        tracing::debug!("Upserted {} chunks for document {}", count, pdf_hash);
        Ok(count)
    }

    /// Returns the most similar chunk texts for the query, best match first,
    /// restricted to the given document.
    pub async fn relevant_chunks(
        &self,
        query: &str,
        pdf_hash: &str,
        gemini: &GeminiClient,
    ) -> Result<Vec<String>, VectorStoreError> {
        let query_embedding = gemini.embed_content(query).await?;

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, query_embedding, SEARCH_LIMIT)
                    .filter(Filter::must([Condition::matches(
                        "pdf_id",
                        pdf_hash.to_string(),
                    )]))
                    .with_payload(true),
            )
            .await?;

        let chunks = search_result
            .result
            .iter()
            .filter_map(|point| {
                point
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
            .collect();

        Ok(chunks)
    }
}
