//! Study Assistant 文档摄取
//!
//! 把本地目录、单个文件或网页加载、切分并写入配置的向量库，供 /search 的检索工具使用。
//!
//! 用法: cargo run --bin study-ingest -- <目录|文件|URL>...

use anyhow::Context;
use study_assistant::{
    agent::create_retrieval_store,
    config::load_config,
    ingest,
    memory::ChunkingConfig,
    observability,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let sources: Vec<String> = std::env::args().skip(1).collect();
    if sources.is_empty() {
        anyhow::bail!("usage: study-ingest <dir|file|url>...");
    }

    let cfg = load_config(None).context("Failed to load config")?;
    let store = create_retrieval_store(&cfg).context("Failed to open vector store")?;
    let chunking = ChunkingConfig {
        chunk_size: cfg.ingest.chunk_size,
        chunk_overlap: cfg.ingest.chunk_overlap,
    };

    let mut total = 0;
    for source in &sources {
        let path = std::path::Path::new(source);
        if path.is_dir() {
            let report = ingest::ingest_directory(path, &store, chunking)
                .await
                .with_context(|| format!("ingest {source}"))?;
            for (skipped, reason) in &report.files_skipped {
                tracing::info!(path = %skipped.display(), %reason, "skipped");
            }
            tracing::info!(
                source = %source,
                files = report.files_loaded,
                chunks = report.chunks_indexed,
                "directory ingested"
            );
            total += report.chunks_indexed;
            continue;
        }
        let documents = ingest::load(source)
            .await
            .with_context(|| format!("load {source}"))?;
        let chunks = ingest::split(&documents, chunking.chunk_size, chunking.chunk_overlap)?;
        let n = ingest::index(&store, chunks)
            .await
            .with_context(|| format!("index {source}"))?;
        tracing::info!(source = %source, chunks = n, "source ingested");
        total += n;
    }

    let stored = store.len().await.context("count vector store")?;
    println!("Indexed {total} chunk(s); vector store now holds {stored}.");
    Ok(())
}
