//! 순위 캐시 운영 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 거래량 순위 캐시 키 확인
//! ranking-cache key volume_ranking market=KOSPI count=20
//!
//! # KOSPI 거래량 순위 전체를 가리키는 무효화 패턴 (한 줄에 하나)
//! ranking-cache pattern volume_ranking market=KOSPI count
//!
//! # 장중 TTL 확인
//! ranking-cache ttl volume_ranking --trading
//!
//! # Redis에 저장된 키 조회 및 무효화
//! RANKING__CACHE__BACKEND=redis ranking-cache keys 'volume_ranking:*'
//! RANKING__CACHE__BACKEND=redis ranking-cache invalidate 'volume_ranking:*'
//! RANKING__CACHE__BACKEND=redis ranking-cache invalidate \
//!     $(ranking-cache pattern volume_ranking market=KOSPI count)
//!
//! # 헬스체크
//! ranking-cache health
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ranking_cache::{HierarchicalCache, KeyPolicy};
use ranking_core::{init_logging, AppConfig, LogConfig, MarketSession};
use tracing::error;

mod commands;

use commands::key::SessionOverride;

#[derive(Parser)]
#[command(name = "ranking-cache")]
#[command(about = "Ranking cache CLI - 거래량 순위 캐시 운영 도구", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 캐시 키 생성
    Key {
        /// 작업 이름 (예: volume_ranking)
        operation: String,

        /// name=value 형식 파라미터
        params: Vec<String>,
    },

    /// 무효화 패턴 생성 (값 없는 name은 와일드카드)
    Pattern {
        /// 작업 이름
        operation: String,

        /// name=value 또는 name
        params: Vec<String>,
    },

    /// 작업별 TTL 계산
    Ttl {
        /// 작업 이름
        operation: String,

        /// 장중으로 간주
        #[arg(long, conflicts_with = "closed")]
        trading: bool,

        /// 장 마감으로 간주
        #[arg(long)]
        closed: bool,
    },

    /// Shared Tier 키 목록
    Keys {
        /// 글롭 패턴 (예: 'volume_ranking:*')
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// 패턴과 일치하는 캐시 무효화
    Invalidate {
        /// 글롭 패턴 (여러 개 가능)
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// 캐시 상태 확인 (JSON)
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if let Err(e) = run(cli.command, &config).await {
        error!("Command failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Commands, config: &AppConfig) -> Result<()> {
    let policy = KeyPolicy::new(MarketSession::from_config(&config.market)?);

    match command {
        Commands::Key { operation, params } => {
            println!("{}", commands::key::build_key(&policy, &operation, &params)?);
        }

        Commands::Pattern { operation, params } => {
            for pattern in commands::key::build_patterns(&policy, &operation, &params)? {
                println!("{}", pattern);
            }
        }

        Commands::Ttl {
            operation,
            trading,
            closed,
        } => {
            let session = SessionOverride::from_flags(trading, closed);
            println!("{}", commands::key::compute_ttl(&policy, &operation, session));
        }

        Commands::Keys { pattern } => {
            let cache = connect(config).await?;
            for key in commands::cache::list_keys(&cache, &pattern).await? {
                println!("{}", key);
            }
            cache.close();
        }

        Commands::Invalidate { patterns } => {
            let cache = connect(config).await?;
            let removed = commands::cache::invalidate(&cache, &patterns).await?;
            println!("{}", removed);
            cache.close();
        }

        Commands::Health => {
            let cache = connect(config).await?;
            println!("{}", commands::cache::health_report(&cache).await?);
            cache.close();
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> Result<HierarchicalCache<serde_json::Value>> {
    HierarchicalCache::from_config(&config.cache, &config.redis)
        .await
        .context("Failed to build cache")
}
