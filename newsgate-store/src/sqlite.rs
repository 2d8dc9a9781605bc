//! SQLite-backed implementation of [`Store`], grounded on the connection
//! pool and migration setup in `rootsignal-events::store`, adapted from
//! Postgres to an embedded single-file store per the Non-goals
//! ("single-process, single-store assumed").

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use newsgate_common::types::*;
use newsgate_common::{PipelineError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::traits::{ItemQuery, NewItem, Store, TriageUpdate};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if absent) the SQLite file at `path`, enable WAL
    /// journaling, and apply embedded migrations.
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_store_err(table: &str, e: sqlx::Error) -> PipelineError {
    PipelineError::StoreConflict {
        table: table.to_string(),
        detail: e.to_string(),
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Item {
    Item {
        id: row.get("id"),
        source: row.get("source"),
        raw_url: row.get("raw_url"),
        normalized_url: row.get("normalized_url"),
        url_hash: row.get("url_hash"),
        title: row.get("title"),
        published_at: row
            .get::<Option<String>, _>("published_at")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        first_seen_at: DateTime::parse_from_rfc3339(&row.get::<String, _>("first_seen_at"))
            .expect("stored timestamp is valid rfc3339")
            .with_timezone(&Utc),
        pipeline_stage: row
            .get::<String, _>("pipeline_stage")
            .parse()
            .expect("stored pipeline_stage is valid"),
        pipeline_run_id: row.get("pipeline_run_id"),
        triage_topic: row.get("triage_topic"),
        triage_confidence: row.get("triage_confidence"),
        is_match: row.get::<i64, _>("is_match") != 0,
        selected_for_processing: row.get::<i64, _>("selected_for_processing") != 0,
        selection_rank: row.get("selection_rank"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_item(&self, item: NewItem) -> Result<Item> {
        sqlx::query(
            "INSERT INTO items (source, raw_url, normalized_url, url_hash, title, published_at, first_seen_at, pipeline_stage)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'collected')
             ON CONFLICT(normalized_url) DO NOTHING",
        )
        .bind(&item.source)
        .bind(&item.raw_url)
        .bind(&item.normalized_url)
        .bind(&item.url_hash)
        .bind(&item.title)
        .bind(item.published_at.map(|d| d.to_rfc3339()))
        .bind(item.first_seen_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("items", e))?;

        self.get_item_by_url_hash(&item.url_hash)
            .await?
            .ok_or_else(|| PipelineError::StoreConflict {
                table: "items".into(),
                detail: "row vanished immediately after upsert".into(),
            })
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_store_err("items", e))?;
        Ok(row.map(|r| row_to_item(&r)))
    }

    async fn get_item_by_url_hash(&self, url_hash: &str) -> Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE url_hash = ? ORDER BY id LIMIT 1")
            .bind(url_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_store_err("items", e))?;
        Ok(row.map(|r| row_to_item(&r)))
    }

    async fn query_items(&self, query: ItemQuery<'_>) -> Result<Vec<Item>> {
        let rows = match query {
            ItemQuery::UnclassifiedForTopic { .. } => {
                sqlx::query("SELECT * FROM items WHERE triage_topic IS NULL")
                    .fetch_all(&self.pool)
                    .await
            }
            ItemQuery::MatchedForRun { run_id } => sqlx::query(
                "SELECT * FROM items WHERE pipeline_run_id = ? AND is_match = 1 AND pipeline_stage = 'matched'",
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await,
            ItemQuery::SelectedAwaitingExtraction { run_id } => sqlx::query(
                "SELECT i.* FROM items i
                 LEFT JOIN extracted_articles e ON e.item_id = i.id
                 WHERE i.pipeline_run_id = ? AND i.is_match = 1 AND i.selected_for_processing = 1
                   AND e.item_id IS NULL",
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await,
            ItemQuery::ExtractedToday { date } => sqlx::query(
                "SELECT i.* FROM items i
                 JOIN extracted_articles e ON e.item_id = i.id
                 WHERE i.is_match = 1
                   AND (date(i.published_at) = ? OR date(i.first_seen_at) = ?)",
            )
            .bind(date.to_string())
            .bind(date.to_string())
            .fetch_all(&self.pool)
            .await,
            ItemQuery::AwaitingSummary { run_id } => sqlx::query(
                "SELECT i.* FROM items i
                 JOIN extracted_articles e ON e.item_id = i.id
                 LEFT JOIN summaries s ON s.item_id = i.id
                 LEFT JOIN article_clusters ac
                   ON ac.article_id = i.id AND ac.clustering_method = 'gpt_title_clustering'
                 WHERE i.pipeline_run_id = ? AND i.is_match = 1 AND s.item_id IS NULL
                   AND length(e.extracted_text) >= 600
                   AND (ac.article_id IS NULL OR ac.is_primary = 1)
                 ORDER BY i.triage_confidence DESC",
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| to_store_err("items", e))?;
        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn record_triage(&self, item_id: i64, verdict: TriageUpdate) -> Result<()> {
        let stage = if verdict.is_match {
            PipelineStage::Matched
        } else {
            PipelineStage::FilteredOut
        };
        sqlx::query(
            "UPDATE items SET triage_topic = ?, triage_confidence = ?, is_match = ?, pipeline_run_id = ?, pipeline_stage = ?
             WHERE id = ?",
        )
        .bind(&verdict.triage_topic)
        .bind(verdict.triage_confidence)
        .bind(verdict.is_match as i64)
        .bind(&verdict.run_id)
        .bind(stage.to_string())
        .bind(item_id)
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("items", e))?;
        Ok(())
    }

    async fn assign_selection(
        &self,
        run_id: &str,
        selected_ids: &[i64],
        rest_ids: &[i64],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| to_store_err("items", e))?;
        for (idx, id) in selected_ids.iter().enumerate() {
            sqlx::query(
                "UPDATE items SET selection_rank = ?, selected_for_processing = 1, pipeline_stage = 'selected'
                 WHERE id = ? AND pipeline_run_id = ?",
            )
            .bind((idx + 1) as i64)
            .bind(id)
            .bind(run_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| to_store_err("items", e))?;
        }
        for id in rest_ids {
            sqlx::query(
                "UPDATE items SET pipeline_stage = 'matched_not_selected' WHERE id = ? AND pipeline_run_id = ?",
            )
            .bind(id)
            .bind(run_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| to_store_err("items", e))?;
        }
        tx.commit().await.map_err(|e| to_store_err("items", e))?;
        Ok(())
    }

    async fn set_stage(&self, item_id: i64, stage: PipelineStage) -> Result<()> {
        sqlx::query("UPDATE items SET pipeline_stage = ? WHERE id = ?")
            .bind(stage.to_string())
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(|e| to_store_err("items", e))?;
        Ok(())
    }

    async fn get_processed_link(&self, url_hash: &str, topic: &str) -> Result<Option<ProcessedLink>> {
        let row = sqlx::query("SELECT * FROM processed_links WHERE url_hash = ? AND topic = ?")
            .bind(url_hash)
            .bind(topic)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_store_err("processed_links", e))?;
        Ok(row.map(|r| ProcessedLink {
            url_hash: r.get("url_hash"),
            url: r.get("url"),
            topic: r.get("topic"),
            processed_at: DateTime::parse_from_rfc3339(&r.get::<String, _>("processed_at"))
                .unwrap()
                .with_timezone(&Utc),
            result: r.get::<String, _>("result").parse().unwrap_or(LinkResult::Error),
            confidence: r.get("confidence"),
        }))
    }

    async fn upsert_processed_link(&self, link: ProcessedLink) -> Result<()> {
        sqlx::query(
            "INSERT INTO processed_links (url_hash, url, topic, processed_at, result, confidence)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(url_hash, topic) DO UPDATE SET
               processed_at = excluded.processed_at, result = excluded.result, confidence = excluded.confidence",
        )
        .bind(&link.url_hash)
        .bind(&link.url)
        .bind(&link.topic)
        .bind(link.processed_at.to_rfc3339())
        .bind(link.result.to_string())
        .bind(link.confidence)
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("processed_links", e))?;
        Ok(())
    }

    async fn get_extracted_article(&self, item_id: i64) -> Result<Option<ExtractedArticle>> {
        let row = sqlx::query("SELECT * FROM extracted_articles WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_store_err("extracted_articles", e))?;
        Ok(row.map(|r| ExtractedArticle {
            item_id: r.get("item_id"),
            extracted_text: r.get("extracted_text"),
            extraction_method: r.get::<String, _>("extraction_method").parse().unwrap_or(ExtractionMethod::Failed),
            extracted_at: DateTime::parse_from_rfc3339(&r.get::<String, _>("extracted_at"))
                .unwrap()
                .with_timezone(&Utc),
            failure_count: r.get("failure_count"),
            last_failure_reason: r.get("last_failure_reason"),
        }))
    }

    async fn upsert_extracted_article(&self, article: ExtractedArticle) -> Result<()> {
        sqlx::query(
            "INSERT INTO extracted_articles (item_id, extracted_text, extraction_method, extracted_at, failure_count, last_failure_reason)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(item_id) DO UPDATE SET
               extracted_text = excluded.extracted_text, extraction_method = excluded.extraction_method,
               extracted_at = excluded.extracted_at",
        )
        .bind(article.item_id)
        .bind(&article.extracted_text)
        .bind(article.extraction_method.to_string())
        .bind(article.extracted_at.to_rfc3339())
        .bind(article.failure_count)
        .bind(&article.last_failure_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("extracted_articles", e))?;
        self.set_stage(article.item_id, PipelineStage::Scraped).await?;
        Ok(())
    }

    async fn record_extraction_failure(&self, item_id: i64, reason: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO extracted_articles (item_id, extracted_text, extraction_method, extracted_at, failure_count, last_failure_reason)
             VALUES (?, '', 'failed', ?, 1, ?)
             ON CONFLICT(item_id) DO UPDATE SET
               failure_count = failure_count + 1, last_failure_reason = excluded.last_failure_reason",
        )
        .bind(item_id)
        .bind(Utc::now().to_rfc3339())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("extracted_articles", e))?;
        Ok(())
    }

    async fn insert_cluster_rows(&self, rows: Vec<ArticleCluster>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| to_store_err("article_clusters", e))?;
        for row in rows {
            sqlx::query(
                "INSERT INTO article_clusters (cluster_id, article_id, is_primary, similarity_score, clustering_method, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(cluster_id, article_id) DO UPDATE SET is_primary = excluded.is_primary",
            )
            .bind(&row.cluster_id)
            .bind(row.article_id)
            .bind(row.is_primary as i64)
            .bind(row.similarity_score)
            .bind(row.clustering_method.to_string())
            .bind(row.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| to_store_err("article_clusters", e))?;
        }
        tx.commit().await.map_err(|e| to_store_err("article_clusters", e))?;
        Ok(())
    }

    async fn cluster_for_article(
        &self,
        article_id: i64,
        method: ClusteringMethod,
    ) -> Result<Option<ArticleCluster>> {
        let row = sqlx::query(
            "SELECT * FROM article_clusters WHERE article_id = ? AND clustering_method = ?",
        )
        .bind(article_id)
        .bind(method.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| to_store_err("article_clusters", e))?;
        Ok(row.map(row_to_cluster))
    }

    async fn cluster_members(&self, cluster_id: &str) -> Result<Vec<ArticleCluster>> {
        let rows = sqlx::query("SELECT * FROM article_clusters WHERE cluster_id = ?")
            .bind(cluster_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_store_err("article_clusters", e))?;
        Ok(rows.iter().map(row_to_cluster).collect())
    }

    async fn get_summary(&self, item_id: i64) -> Result<Option<Summary>> {
        let row = sqlx::query("SELECT * FROM summaries WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_store_err("summaries", e))?;
        Ok(row.map(|r| row_to_summary(&r)))
    }

    async fn upsert_summary(&self, summary: Summary) -> Result<()> {
        sqlx::query(
            "INSERT INTO summaries (item_id, topic, model, summary, key_points, entities, created_at, topic_already_covered, cross_run_cluster_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(item_id) DO UPDATE SET
               summary = excluded.summary, key_points = excluded.key_points, entities = excluded.entities",
        )
        .bind(summary.item_id)
        .bind(&summary.topic)
        .bind(&summary.model)
        .bind(&summary.summary)
        .bind(serde_json::to_string(&summary.key_points).unwrap())
        .bind(serde_json::to_string(&summary.entities).unwrap())
        .bind(summary.created_at.to_rfc3339())
        .bind(summary.topic_already_covered as i64)
        .bind(&summary.cross_run_cluster_id)
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("summaries", e))?;
        self.set_stage(summary.item_id, PipelineStage::Summarized).await?;
        Ok(())
    }

    async fn summaries_for_date_topic(
        &self,
        date: NaiveDate,
        topic: &str,
        only_new: bool,
    ) -> Result<Vec<(Summary, Item, Option<ArticleCluster>)>> {
        let covered_clause = if only_new { "AND s.topic_already_covered = 0" } else { "" };
        let sql = format!(
            "SELECT s.*, i.*, ac.cluster_id as ac_cluster_id, ac.is_primary as ac_is_primary,
                    ac.similarity_score as ac_similarity_score, ac.clustering_method as ac_clustering_method,
                    ac.created_at as ac_created_at, ac.article_id as ac_article_id
             FROM summaries s
             JOIN items i ON i.id = s.item_id
             LEFT JOIN article_clusters ac
               ON ac.article_id = s.item_id AND ac.clustering_method = 'gpt_title_clustering'
             WHERE s.topic = ? AND (date(i.published_at) = ? OR date(i.first_seen_at) = ?) {covered_clause}
             ORDER BY i.triage_confidence DESC, s.created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(topic)
            .bind(date.to_string())
            .bind(date.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_store_err("summaries", e))?;

        Ok(rows
            .iter()
            .map(|r| {
                let summary = row_to_summary(r);
                let item = row_to_item(r);
                let cluster = r
                    .get::<Option<String>, _>("ac_cluster_id")
                    .map(|cluster_id| ArticleCluster {
                        cluster_id,
                        article_id: r.get("ac_article_id"),
                        is_primary: r.get::<i64, _>("ac_is_primary") != 0,
                        similarity_score: r.get("ac_similarity_score"),
                        clustering_method: r
                            .get::<String, _>("ac_clustering_method")
                            .parse()
                            .unwrap_or(ClusteringMethod::GptTitleClustering),
                        created_at: DateTime::parse_from_rfc3339(&r.get::<String, _>("ac_created_at"))
                            .unwrap()
                            .with_timezone(&Utc),
                    });
                (summary, item, cluster)
            })
            .collect())
    }

    async fn mark_topic_covered(&self, item_id: i64, cross_run_cluster_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE summaries SET topic_already_covered = 1, cross_run_cluster_id = ? WHERE item_id = ?",
        )
        .bind(cross_run_cluster_id)
        .bind(item_id)
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("summaries", e))?;
        Ok(())
    }

    async fn signatures_for_date(&self, date: NaiveDate) -> Result<Vec<TopicSignature>> {
        let rows = sqlx::query(
            "SELECT * FROM topic_signatures WHERE date = ? ORDER BY run_sequence, created_at",
        )
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| to_store_err("topic_signatures", e))?;
        Ok(rows.iter().map(row_to_signature).collect())
    }

    async fn insert_signatures(&self, rows: Vec<TopicSignature>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| to_store_err("topic_signatures", e))?;
        for row in rows {
            sqlx::query(
                "INSERT INTO topic_signatures (signature_id, date, article_summary, topic_theme, source_article_id, run_sequence, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.signature_id)
            .bind(row.date.to_string())
            .bind(&row.article_summary)
            .bind(&row.topic_theme)
            .bind(row.source_article_id)
            .bind(row.run_sequence)
            .bind(row.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| to_store_err("topic_signatures", e))?;
        }
        tx.commit().await.map_err(|e| to_store_err("topic_signatures", e))?;
        Ok(())
    }

    async fn purge_signatures_older_than(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM topic_signatures WHERE date < ?")
            .bind(cutoff.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| to_store_err("topic_signatures", e))?;
        Ok(result.rows_affected())
    }

    async fn insert_dedup_log(&self, entry: DeduplicationLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO dedup_log (date, new_article_id, matched_signature_id, decision, confidence_score, processing_time_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.date.to_string())
        .bind(entry.new_article_id)
        .bind(&entry.matched_signature_id)
        .bind(match entry.decision {
            DedupDecision::Duplicate => "duplicate",
            DedupDecision::Unique => "unique",
        })
        .bind(entry.confidence_score)
        .bind(entry.processing_time_ms)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("dedup_log", e))?;
        Ok(())
    }

    async fn get_digest_state(&self, date: NaiveDate, topic: &str) -> Result<Option<DigestState>> {
        let row = sqlx::query("SELECT * FROM digest_state WHERE digest_date = ? AND topic = ?")
            .bind(date.to_string())
            .bind(topic)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_store_err("digest_state", e))?;
        Ok(row.map(|r| row_to_digest_state(&r)))
    }

    async fn save_digest_state(&self, state: DigestState) -> Result<()> {
        sqlx::query(
            "INSERT INTO digest_state (digest_date, topic, processed_article_ids, digest_content, article_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(digest_date, topic) DO UPDATE SET
               processed_article_ids = excluded.processed_article_ids,
               digest_content = excluded.digest_content,
               article_count = excluded.article_count,
               updated_at = excluded.updated_at",
        )
        .bind(state.digest_date.to_string())
        .bind(&state.topic)
        .bind(serde_json::to_string(&state.processed_article_ids).unwrap())
        .bind(serde_json::to_string(&state.digest_content).unwrap())
        .bind(state.article_count)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("digest_state", e))?;
        Ok(())
    }

    async fn all_digest_states(&self, date: NaiveDate) -> Result<Vec<DigestState>> {
        let rows = sqlx::query("SELECT * FROM digest_state WHERE digest_date = ?")
            .bind(date.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_store_err("digest_state", e))?;
        Ok(rows.iter().map(row_to_digest_state).collect())
    }

    async fn insert_digest_generation_log(&self, entry: DigestGenerationLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO digest_generation_log (digest_date, generation_type, topics_processed, total_articles, new_articles, api_calls_made, execution_time_seconds, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.digest_date.to_string())
        .bind(match entry.generation_type {
            GenerationType::Full => "full",
            GenerationType::Incremental => "incremental",
            GenerationType::Cached => "cached",
        })
        .bind(entry.topics_processed)
        .bind(entry.total_articles)
        .bind(entry.new_articles)
        .bind(entry.api_calls_made)
        .bind(entry.execution_time_seconds)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("digest_generation_log", e))?;
        Ok(())
    }

    async fn upsert_step_state(&self, state: PipelineStepState) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipeline_step_state (run_id, step_name, status, started_at, completed_at, metadata, article_count, match_count, error_message, can_resume)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(run_id, step_name) DO UPDATE SET
               status = excluded.status, started_at = COALESCE(pipeline_step_state.started_at, excluded.started_at),
               completed_at = excluded.completed_at, metadata = excluded.metadata,
               article_count = excluded.article_count, match_count = excluded.match_count,
               error_message = excluded.error_message, can_resume = excluded.can_resume",
        )
        .bind(&state.run_id)
        .bind(state.step_name.to_string())
        .bind(state.status.to_string())
        .bind(state.started_at.map(|d| d.to_rfc3339()))
        .bind(state.completed_at.map(|d| d.to_rfc3339()))
        .bind(state.metadata.to_string())
        .bind(state.article_count)
        .bind(state.match_count)
        .bind(&state.error_message)
        .bind(state.can_resume as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("pipeline_step_state", e))?;
        Ok(())
    }

    async fn get_step_state(&self, run_id: &str, step: StepName) -> Result<Option<PipelineStepState>> {
        let row = sqlx::query("SELECT * FROM pipeline_step_state WHERE run_id = ? AND step_name = ?")
            .bind(run_id)
            .bind(step.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_store_err("pipeline_step_state", e))?;
        Ok(row.map(|r| row_to_step_state(&r)))
    }

    async fn steps_for_run(&self, run_id: &str) -> Result<Vec<PipelineStepState>> {
        let rows = sqlx::query("SELECT * FROM pipeline_step_state WHERE run_id = ?")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_store_err("pipeline_step_state", e))?;
        Ok(rows.iter().map(row_to_step_state).collect())
    }

    async fn purge_step_states_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM pipeline_step_state WHERE started_at < ? AND status NOT IN ('running', 'paused')",
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| to_store_err("pipeline_step_state", e))?;
        Ok(result.rows_affected())
    }
}

fn row_to_cluster(r: &sqlx::sqlite::SqliteRow) -> ArticleCluster {
    ArticleCluster {
        cluster_id: r.get("cluster_id"),
        article_id: r.get("article_id"),
        is_primary: r.get::<i64, _>("is_primary") != 0,
        similarity_score: r.get("similarity_score"),
        clustering_method: r.get::<String, _>("clustering_method").parse().unwrap_or(ClusteringMethod::GptTitleClustering),
        created_at: DateTime::parse_from_rfc3339(&r.get::<String, _>("created_at"))
            .unwrap()
            .with_timezone(&Utc),
    }
}

fn row_to_summary(r: &sqlx::sqlite::SqliteRow) -> Summary {
    Summary {
        item_id: r.get("item_id"),
        topic: r.get("topic"),
        model: r.get("model"),
        summary: r.get("summary"),
        key_points: serde_json::from_str(&r.get::<String, _>("key_points")).unwrap_or_default(),
        entities: serde_json::from_str(&r.get::<String, _>("entities")).unwrap_or_default(),
        created_at: DateTime::parse_from_rfc3339(&r.get::<String, _>("created_at"))
            .unwrap()
            .with_timezone(&Utc),
        topic_already_covered: r.get::<i64, _>("topic_already_covered") != 0,
        cross_run_cluster_id: r.get("cross_run_cluster_id"),
    }
}

fn row_to_signature(r: &sqlx::sqlite::SqliteRow) -> TopicSignature {
    TopicSignature {
        signature_id: r.get("signature_id"),
        date: NaiveDate::parse_from_str(&r.get::<String, _>("date"), "%Y-%m-%d").unwrap(),
        article_summary: r.get("article_summary"),
        topic_theme: r.get("topic_theme"),
        source_article_id: r.get("source_article_id"),
        run_sequence: r.get("run_sequence"),
        created_at: DateTime::parse_from_rfc3339(&r.get::<String, _>("created_at"))
            .unwrap()
            .with_timezone(&Utc),
    }
}

fn row_to_digest_state(r: &sqlx::sqlite::SqliteRow) -> DigestState {
    DigestState {
        digest_date: NaiveDate::parse_from_str(&r.get::<String, _>("digest_date"), "%Y-%m-%d").unwrap(),
        topic: r.get("topic"),
        processed_article_ids: serde_json::from_str(&r.get::<String, _>("processed_article_ids")).unwrap_or_default(),
        digest_content: serde_json::from_str(&r.get::<String, _>("digest_content")).expect("digest_content is valid json"),
        article_count: r.get("article_count"),
        created_at: DateTime::parse_from_rfc3339(&r.get::<String, _>("created_at")).unwrap().with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&r.get::<String, _>("updated_at")).unwrap().with_timezone(&Utc),
    }
}

fn row_to_step_state(r: &sqlx::sqlite::SqliteRow) -> PipelineStepState {
    PipelineStepState {
        run_id: r.get("run_id"),
        step_name: r.get::<String, _>("step_name").parse().expect("valid step_name"),
        status: r.get::<String, _>("status").parse().expect("valid status"),
        started_at: r.get::<Option<String>, _>("started_at").and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        completed_at: r.get::<Option<String>, _>("completed_at").and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        metadata: serde_json::from_str(&r.get::<String, _>("metadata")).unwrap_or(serde_json::json!({})),
        article_count: r.get("article_count"),
        match_count: r.get("match_count"),
        error_message: r.get("error_message"),
        can_resume: r.get::<i64, _>("can_resume") != 0,
    }
}

