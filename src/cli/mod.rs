//! CLI 모듈
//!
//! mid-rag CLI 명령어 정의 및 구현

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::RagConfig;
use crate::llm::{ChatProvider, EmbeddingProvider, OllamaClient};
use crate::notes::LearningStore;
use crate::retrieval::{
    ApproximateRetriever, HybridRag, LanceVectorStore, MedicineStore, SchemaDescriptor,
    VectorStore,
};

/// 인덱스 리빌드 시 풀스캔 행 상한
const INDEX_ROW_CAP: usize = 5000;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "mid-rag")]
#[command(version, about = "의약품 데이터셋 하이브리드 RAG", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// JSON 코퍼스를 SQLite에 적재하고 벡터 인덱스를 리빌드
    Ingest {
        /// 코퍼스 JSON 파일 경로 (행 객체 배열)
        #[arg(short, long)]
        corpus: PathBuf,

        /// 벡터 인덱스 리빌드 건너뛰기 (SQLite 적재만)
        #[arg(long)]
        skip_index: bool,
    },

    /// 단일 질문에 응답
    Ask {
        /// 질문
        question: String,

        /// 벡터 검색 결과 개수
        #[arg(short, long)]
        k: Option<usize>,

        /// 응답을 학습 노트로 저장
        #[arg(long)]
        save: bool,
    },

    /// 대화형 질의 루프 (exit 또는 quit로 종료)
    Chat,

    /// 학습 노트 관리
    Notes {
        #[command(subcommand)]
        command: NotesCommands,
    },

    /// 상태 확인
    Status,
}

#[derive(Subcommand)]
pub enum NotesCommands {
    /// 저장된 노트 목록
    List,

    /// 노트를 마크다운으로 내보내기
    Export {
        /// 출력 파일 경로
        #[arg(short, long, default_value = "notes.md")]
        output: PathBuf,
    },

    /// 복습 기한이 된 플래시카드 목록
    Review {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::from_env();

    match cli.command {
        Commands::Ingest { corpus, skip_index } => cmd_ingest(&config, &corpus, skip_index).await,
        Commands::Ask { question, k, save } => cmd_ask(&config, &question, k, save).await,
        Commands::Chat => cmd_chat(&config).await,
        Commands::Notes { command } => cmd_notes(&config, command),
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Pipeline Construction
// ============================================================================

/// 질의 파이프라인 조립
///
/// Ollama 클라이언트는 채팅과 임베딩 역할을 겸하며 Arc 핸들로
/// 양쪽에 주입됩니다. 질문 간 공유되는 가변 상태는 없습니다.
async fn build_rag(config: &RagConfig) -> Result<HybridRag> {
    let store = MedicineStore::new(config.db_path());
    if !store.exists() {
        bail!(
            "의약품 DB가 없습니다: {}\n먼저 ingest 명령으로 코퍼스를 적재하세요",
            config.db_path().display()
        );
    }

    let client = Arc::new(OllamaClient::new(&config.ollama)?);
    if !client.health_check().await {
        bail!(
            "Ollama 서버에 연결할 수 없습니다: {}\n\
             실행: ollama serve (모델: {}, {})",
            config.ollama.base_url,
            config.ollama.chat_model,
            config.ollama.embed_model
        );
    }

    let lance = LanceVectorStore::open(&config.lance_path())
        .await
        .context("벡터 스토어 열기 실패")?;
    let approx = ApproximateRetriever::new(
        client.clone() as Arc<dyn EmbeddingProvider>,
        Arc::new(lance) as Arc<dyn VectorStore>,
    );

    Ok(HybridRag::new(
        store,
        approx,
        client as Arc<dyn ChatProvider>,
        Arc::new(SchemaDescriptor::mid_drugs()),
        config.search_k,
        config.max_context_chars,
    ))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 코퍼스 적재 명령어 (ingest)
///
/// JSON 코퍼스를 SQLite에 적재하고, 이어서 벡터 인덱스를 리빌드합니다.
async fn cmd_ingest(config: &RagConfig, corpus: &Path, skip_index: bool) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir).context("데이터 디렉토리 생성 실패")?;

    let schema = SchemaDescriptor::mid_drugs();
    let store = MedicineStore::new(config.db_path());

    println!("[*] 코퍼스 적재 중: {}", corpus.display());
    let inserted = store
        .load_corpus(corpus, &schema)
        .context("코퍼스 적재 실패")?;
    println!("[OK] {} 행 적재됨 ({})", inserted, config.db_path().display());

    if skip_index {
        println!("[!] 벡터 인덱스 리빌드를 건너뜁니다 (--skip-index)");
        return Ok(());
    }

    // 임베딩에 Ollama 필요
    let client = Arc::new(OllamaClient::new(&config.ollama)?);
    if !client.health_check().await {
        bail!(
            "Ollama 서버에 연결할 수 없습니다: {}\n\
             실행: ollama serve (임베딩 모델: {})",
            config.ollama.base_url,
            config.ollama.embed_model
        );
    }

    let lance = LanceVectorStore::open(&config.lance_path())
        .await
        .context("벡터 스토어 열기 실패")?;
    let approx = ApproximateRetriever::new(
        client as Arc<dyn EmbeddingProvider>,
        Arc::new(lance) as Arc<dyn VectorStore>,
    );

    println!("[*] 벡터 인덱스 리빌드 중 ({} 행 임베딩)...", inserted);
    let rows = store.all_rows(&schema, INDEX_ROW_CAP)?;
    let indexed = approx
        .rebuild(&rows, &schema, config.chunk_max_chars)
        .await
        .context("벡터 인덱스 리빌드 실패")?;
    println!("[OK] 벡터 인덱스: {} 청크", indexed);

    Ok(())
}

/// 단일 질문 명령어 (ask)
async fn cmd_ask(config: &RagConfig, question: &str, k: Option<usize>, save: bool) -> Result<()> {
    let mut effective = config.clone();
    if let Some(k) = k {
        effective.search_k = k;
    }

    let rag = build_rag(&effective).await?;

    println!("[*] 질문: {}", question);
    let answer = rag.ask(question).await;
    println!("\n{}", answer);

    if save {
        let notes = LearningStore::open(&config.notes_path()).context("학습 노트 DB 열기 실패")?;
        let note_id = notes
            .save_note(question, &answer, &[])
            .context("노트 저장 실패")?;
        println!("\n[OK] 노트 #{} 저장됨", note_id);
    }

    Ok(())
}

/// 대화형 질의 명령어 (chat)
///
/// 한 줄에 한 질문. 질문 간 상태는 공유되지 않으며,
/// 한 질문의 실패가 루프를 죽이지 않습니다.
async fn cmd_chat(config: &RagConfig) -> Result<()> {
    let rag = build_rag(config).await?;

    println!("mid-rag 대화 모드 (exit 또는 quit로 종료)");

    let stdin = io::stdin();
    loop {
        print!("\n질문> ");
        io::stdout().flush().context("stdout flush 실패")?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("입력 읽기 실패")?;
        if read == 0 {
            // EOF
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let answer = rag.ask(question).await;
        println!("\n{}", answer);
    }

    println!("[OK] 종료합니다");
    Ok(())
}

/// 노트 명령어 (notes)
fn cmd_notes(config: &RagConfig, command: NotesCommands) -> Result<()> {
    let store = LearningStore::open(&config.notes_path()).context("학습 노트 DB 열기 실패")?;

    match command {
        NotesCommands::List => {
            let notes = store.list_notes().context("노트 목록 조회 실패")?;

            if notes.is_empty() {
                println!("[!] 저장된 노트가 없습니다.");
                return Ok(());
            }

            println!("[OK] 저장된 노트 ({} 건):\n", notes.len());
            for note in notes {
                println!("  #{:<4} {}", note.id, truncate_text(&note.question, 60));
                println!(
                    "        {} | {}",
                    note.created_at.format("%Y-%m-%d %H:%M"),
                    truncate_text(&note.answer, 80)
                );
                println!();
            }
        }
        NotesCommands::Export { output } => {
            let count = store
                .export_notes_markdown(&output)
                .context("노트 내보내기 실패")?;
            println!("[OK] 노트 {} 건 내보냄: {}", count, output.display());
        }
        NotesCommands::Review { limit } => {
            let cards = store
                .due_flashcards(limit)
                .context("플래시카드 조회 실패")?;

            if cards.is_empty() {
                println!("[!] 복습할 플래시카드가 없습니다.");
                return Ok(());
            }

            println!("[OK] 복습 대상 ({} 건):\n", cards.len());
            for card in cards {
                println!(
                    "  #{:<4} [{}] {}",
                    card.id,
                    card.topic,
                    truncate_text(&card.front, 60)
                );
            }
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("mid-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    // 의약품 DB
    let schema = SchemaDescriptor::mid_drugs();
    let store = MedicineStore::new(config.db_path());
    if store.exists() {
        match store.count(&schema) {
            Ok(n) => println!("[OK] 의약품 DB: {} 행", n),
            Err(e) => println!("[!] 의약품 DB 조회 실패: {}", e),
        }
    } else {
        println!("[!] 의약품 DB 없음 (ingest로 적재하세요)");
    }

    // 벡터 인덱스
    if config.lance_path().exists() {
        match LanceVectorStore::open(&config.lance_path()).await {
            Ok(lance) => match lance.count().await {
                Ok(n) => println!("[OK] 벡터 인덱스: {} 청크", n),
                Err(e) => {
                    tracing::debug!("Vector index count failed: {}", e);
                    println!("[!] 벡터 인덱스 조회 실패");
                }
            },
            Err(e) => {
                tracing::debug!("Vector store open failed: {}", e);
                println!("[!] 벡터 스토어 열기 실패");
            }
        }
    } else {
        println!("[!] 벡터 인덱스 없음");
    }

    // Ollama 연결 상태
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            if client.health_check().await {
                println!(
                    "[OK] Ollama: {} (chat: {}, embed: {})",
                    config.ollama.base_url, config.ollama.chat_model, config.ollama.embed_model
                );
            } else {
                println!("[!] Ollama: 연결 실패 ({})", config.ollama.base_url);
            }
        }
        Err(e) => println!("[!] Ollama 클라이언트 생성 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["mid-rag", "ask", "아스피린 효능은?", "--save"])
            .expect("parse failed");

        match cli.command {
            Commands::Ask { question, k, save } => {
                assert_eq!(question, "아스피린 효능은?");
                assert!(k.is_none());
                assert!(save);
            }
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from(["mid-rag", "ingest", "--corpus", "drugs.json"])
            .expect("parse failed");

        match cli.command {
            Commands::Ingest { corpus, skip_index } => {
                assert_eq!(corpus, PathBuf::from("drugs.json"));
                assert!(!skip_index);
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn test_parse_notes_export_default() {
        let cli = Cli::try_parse_from(["mid-rag", "notes", "export"]).expect("parse failed");

        match cli.command {
            Commands::Notes {
                command: NotesCommands::Export { output },
            } => assert_eq!(output, PathBuf::from("notes.md")),
            _ => panic!("expected notes export command"),
        }
    }
}
