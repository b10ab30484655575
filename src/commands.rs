//! CLI command runners. Each prints its result to stdout.

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use notebook_rag_core::chunk::chunk_document;
use notebook_rag_core::context::{format_citations, format_system_prompt};
use notebook_rag_core::expand::expand_query;

use crate::config::Config;
use crate::corpus::load_corpus;
use crate::rag::{RagOptions, RagService, SearchHit};

/// Search the corpus and print ranked hits.
pub async fn run_search(
    config: Config,
    query: &str,
    mode: &str,
    notebook: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let use_hybrid = match mode {
        "hybrid" => true,
        "semantic" => false,
        _ => bail!("Unknown search mode: {}. Use semantic or hybrid.", mode),
    };

    let k = limit.unwrap_or(config.retrieval.top_k);
    let rag = RagService::open(config).await?;
    let cancel = ctrl_c_token();
    let hits = if use_hybrid {
        rag.hybrid_search(query, k, notebook.as_deref(), &cancel).await?
    } else {
        rag.semantic_search(query, k, notebook.as_deref(), &cancel).await?
    };

    print_hits(&hits);
    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, hit.score, hit.note_title);
        if let Some(ref nb) = hit.notebook_id {
            println!("    notebook: {}", nb);
        }
        if !hit.tags.is_empty() {
            println!("    tags: {}", hit.tags.join(", "));
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.text, 160));
        println!("    id: {}", hit.note_id);
        println!();
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}

/// Build a RAG context for a question and print it.
pub async fn run_ask(
    config: Config,
    question: &str,
    notebook: Option<String>,
    limit: Option<usize>,
    options: RagOptions,
    show_prompt: bool,
) -> Result<()> {
    let k = limit.unwrap_or(config.retrieval.top_k);
    let rag = RagService::open(config).await?;
    let cancel = ctrl_c_token();
    let ctx = rag
        .build_rag_context(question, k, notebook.as_deref(), options, &cancel)
        .await?;

    println!(
        "--- Context ({} sources, {}) ---",
        ctx.result_count,
        ctx.retrieval_method.as_str()
    );
    if ctx.has_context {
        println!("{}", ctx.context_text);
        println!();
        println!("--- Citations ---");
        println!("{}", format_citations(&ctx.sources));
    } else {
        println!("No relevant notes.");
    }

    if show_prompt {
        println!();
        println!("--- System prompt ---");
        println!("{}", format_system_prompt(&ctx));
    }
    Ok(())
}

/// Print the synonym-expanded form of a query.
pub fn run_expand(query: &str) {
    println!("{}", expand_query(query));
}

/// Print how a corpus document is chunked.
pub fn run_chunk(config: &Config, id: &str) -> Result<()> {
    let docs = load_corpus(&config.corpus.path)?;
    let Some(doc) = docs.iter().find(|d| d.id == id) else {
        bail!("Document not found: {}", id);
    };

    let chunks = chunk_document(doc, config.chunking.chunk_size, config.chunking.overlap);
    println!("--- {} ({} chunks) ---", doc.title, chunks.len());
    for chunk in &chunks {
        let label = if chunk.is_full_document { " full" } else { "" };
        println!("[chunk {}{}] {} chars", chunk.index, label, chunk.text.chars().count());
        println!("{}", chunk.text);
        println!();
    }
    Ok(())
}

/// A token canceled on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}
