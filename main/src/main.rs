use std::{path::PathBuf, sync::Arc};

use async_openai::{config::OpenAIConfig, Client};
use clap::{Parser, Subcommand};
use common::{
    storage::{
        db::SurrealDbClient,
        types::{lesson::Lesson, lesson_chunk::LessonChunk},
    },
    utils::{
        config::{get_config, AppConfig},
        embedding::EmbeddingProvider,
        llm::{LanguageModel, OpenAiChatModel},
    },
};
use knowledge_pipeline::{
    agents::{generate_revision_plan, RevisionRequest},
    answer_question,
    extraction::{TextExtractor, WhisperRecognizer},
    submit_lesson_upload, KnowledgePipeline, LessonVectorIndex, PipelineConfig, PipelineQueue,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "knowledge", version, about = "Turns lesson recordings and documents into searchable knowledge")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach a PDF, audio or video file to a lesson and process it.
    ///
    /// Accepts pdf, mp3, wav, mp4, mov and avi. MOV and AVI videos are stored but the
    /// transcription service cannot read them, so their lessons end up failed.
    Upload {
        #[arg(long)]
        lesson: String,
        /// Title used when the lesson does not exist yet.
        #[arg(long)]
        title: Option<String>,
        path: PathBuf,
    },
    /// Show the processing status and knowledge of a lesson.
    Status {
        #[arg(long)]
        lesson: String,
    },
    /// Answer a question from indexed lesson chunks.
    Ask {
        /// Restrict retrieval to one lesson.
        #[arg(long)]
        lesson: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
        question: String,
    },
    /// Draft a revision plan for a processed lesson.
    Revise {
        #[arg(long)]
        lesson: String,
        /// Topics the learner struggles with.
        #[arg(long)]
        weak: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let openai_client = Arc::new(Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));
    let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(
        Arc::clone(&openai_client),
        config.processing_model.clone(),
    ));

    match cli.command {
        Command::Upload {
            lesson,
            title,
            path,
        } => upload(&config, db, openai_client, llm, lesson, title, path).await?,
        Command::Status { lesson } => status(&db, &lesson).await?,
        Command::Ask {
            lesson,
            top_k,
            question,
        } => {
            let index = vector_index(&config, Arc::clone(&db), openai_client).await?;
            let top_k = top_k.unwrap_or(config.query_top_k);
            let answer =
                answer_question(llm.as_ref(), &index, lesson.as_deref(), &question, top_k).await?;

            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for source in &answer.sources {
                    println!(
                        "  [{} #{}] distance {:.4}",
                        source.lesson_id, source.chunk_index, source.distance
                    );
                }
            }
        }
        Command::Revise { lesson, weak } => {
            let lesson = Lesson::get(&lesson, &db)
                .await?
                .ok_or_else(|| format!("lesson {lesson} not found"))?;
            let plan = generate_revision_plan(
                llm.as_ref(),
                RevisionRequest {
                    title: &lesson.title,
                    summary: lesson.summary.as_deref().unwrap_or_default(),
                    concepts: lesson.concepts.as_deref().unwrap_or_default(),
                    weak_topics: weak.as_deref(),
                },
            )
            .await?;
            println!("{plan}");
        }
    }

    Ok(())
}

async fn vector_index(
    config: &AppConfig,
    db: Arc<SurrealDbClient>,
    openai_client: Arc<Client<OpenAIConfig>>,
) -> Result<LessonVectorIndex, Box<dyn std::error::Error>> {
    let embeddings = EmbeddingProvider::from_config(config, openai_client).await?;
    info!(
        backend = embeddings.backend_label(),
        dimension = embeddings.dimension(),
        "embedding provider ready"
    );
    Ok(LessonVectorIndex::new(db, Arc::new(embeddings)))
}

async fn upload(
    config: &AppConfig,
    db: Arc<SurrealDbClient>,
    openai_client: Arc<Client<OpenAIConfig>>,
    llm: Arc<dyn LanguageModel>,
    lesson_id: String,
    title: Option<String>,
    path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    if Lesson::get(&lesson_id, &db).await?.is_none() {
        let title = title.unwrap_or_else(|| lesson_id.clone());
        db.store_item(Lesson::with_id(lesson_id.clone(), title))
            .await?;
        info!(%lesson_id, "lesson created");
    }

    let index = vector_index(config, Arc::clone(&db), Arc::clone(&openai_client)).await?;
    let recognizer = Arc::new(WhisperRecognizer::new(
        openai_client,
        config.transcription_model.clone(),
        config.transcription_language.clone(),
    ));
    let extractor = TextExtractor::new(recognizer, config.data_dir.clone());
    let pipeline = Arc::new(KnowledgePipeline::new(
        Arc::clone(&db),
        extractor,
        llm,
        index,
        PipelineConfig::from_app_config(config),
    ));

    let queue = PipelineQueue::start(pipeline, config.pipeline_workers, config.queue_capacity);
    submit_lesson_upload(&db, &queue, &lesson_id, &path).await?;
    queue.shutdown().await?;

    status(&db, &lesson_id).await
}

async fn status(db: &SurrealDbClient, lesson_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let lesson = Lesson::get(lesson_id, db)
        .await?
        .ok_or_else(|| format!("lesson {lesson_id} not found"))?;
    let chunks = LessonChunk::list_for_lesson(lesson_id, db).await?;

    println!("{} ({})", lesson.title, lesson.id);
    println!("status: {}", lesson.transcript_status);
    println!("processed: {}", lesson.processed);
    println!("chunks: {}", chunks.len());
    if let Some(summary) = &lesson.summary {
        println!("\nSummary:\n{summary}");
    }
    if let Some(takeaways) = &lesson.key_takeaways {
        println!("\nKey takeaways:\n{takeaways}");
    }
    if let Some(concepts) = &lesson.concepts {
        println!("\nConcepts:\n{concepts}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn upload_help_warns_about_untranscribable_videos() {
        let command = Cli::command();
        let upload = command
            .find_subcommand("upload")
            .expect("upload subcommand");
        let help = upload
            .get_long_about()
            .map(ToString::to_string)
            .unwrap_or_default();
        assert!(help.contains("MOV and AVI"), "unexpected help: {help}");
    }

    #[test]
    fn ask_takes_optional_lesson_and_top_k() {
        let cli = Cli::try_parse_from([
            "knowledge",
            "ask",
            "--lesson",
            "bio-1",
            "--top-k",
            "3",
            "What is chlorophyll?",
        ])
        .expect("parse");
        match cli.command {
            Command::Ask {
                lesson,
                top_k,
                question,
            } => {
                assert_eq!(lesson.as_deref(), Some("bio-1"));
                assert_eq!(top_k, Some(3));
                assert_eq!(question, "What is chlorophyll?");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
