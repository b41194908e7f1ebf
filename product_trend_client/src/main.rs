use chrono::Utc;
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use product_trend_client::comparison::{ComparisonSelection, SelectionChange};
use product_trend_client::dashboard::{dashboard_metrics, trending_products, weekly_activity};
use product_trend_client::export::{
    analysis_report_json, comparison_report_json, csv_file_name, format_analysis_date,
    report_file_name,
};
use product_trend_client::identity::{RestIdentityProvider, SocialProvider};
use product_trend_client::insights::analysis_insights;
use product_trend_client::metrics::{format_magnitude, percent, record_opportunity_score};
use product_trend_client::services::history::{
    DeleteOutcome, SentimentFilter, SortDirection, SortKey, TrendFilter,
};
use product_trend_client::services::status;
use product_trend_client::session::format_elapsed;
use product_trend_client::{
    load_config, AnalysisRecord, AppConfig, AppState, ClientError, FileTokenStore, Session,
    TokenStore,
};

#[derive(Parser, Debug)]
#[command(name = "product-trend", version, about = "Клиент сервиса анализа трендов продуктов")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Вход по email и паролю или через Google
    Login {
        #[arg(long)]
        email: Option<String>,
        /// ID токен Google для входа через внешний аккаунт
        #[arg(long)]
        google_token: Option<String>,
    },
    /// Регистрация нового аккаунта
    Signup {
        #[arg(long)]
        email: Option<String>,
    },
    /// Выход и удаление сохранённого токена
    Logout,
    /// Текущий пользователь
    Whoami,
    /// История анализов с фильтрами и сортировкой
    History {
        #[arg(short, long, default_value = "")]
        search: String,
        #[arg(long, default_value = "all")]
        trend: TrendFilter,
        #[arg(long, default_value = "all")]
        sentiment: SentimentFilter,
        #[arg(long, default_value = "timestamp")]
        sort: SortKey,
        #[arg(long, default_value = "desc")]
        direction: SortDirection,
        /// Сохранить видимые записи в CSV (без пути используется имя по дате)
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        csv: Option<String>,
    },
    /// Удаление анализа
    Delete {
        id: String,
        /// Не спрашивать подтверждение
        #[arg(short, long)]
        yes: bool,
    },
    /// Сравнение до пяти продуктов
    Compare {
        #[arg(required = true, num_args = 1..)]
        products: Vec<String>,
        /// Вывести JSON отчёт сравнения
        #[arg(long)]
        json: bool,
        /// Сохранить отчёт, сформированный бэкендом
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Новый анализ продукта
    Analyze {
        product: String,
        #[arg(short, long)]
        time_range: Option<String>,
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        /// Сохранить JSON отчёт по анализу
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        report: Option<String>,
    },
    /// Профиль пользователя
    Profile,
    /// Сводка по всем анализам
    Dashboard,
    /// Состояние бэкенда и уведомления
    Status {
        /// Проверять периодически до Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;
    let _log_guard = init_logging(&config);

    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.token_path.clone()));
    let state = AppState::new(&config, tokens.clone())?;

    match run(cli.command, &config, &state, tokens).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // Ошибки клиента показываем пользовательским сообщением
            if let Some(client_error) = e.downcast_ref::<ClientError>() {
                tracing::error!("{}", client_error);
                eprintln!("Ошибка: {}", client_error.user_message());
                if matches!(client_error, ClientError::Auth(_)) {
                    eprintln!("Выполните `product-trend login`");
                }
                std::process::exit(1);
            }
            Err(e)
        }
    }
}

fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Настройка структурированного логирования
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("product_trend_client=info,warn"));

    let console = if config.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "product_trend_client.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("product_trend_client=debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console.with_filter(env_filter))
        .with(file_layer)
        .init();

    guard
}

async fn run(
    command: Commands,
    config: &AppConfig,
    state: &AppState,
    tokens: Arc<dyn TokenStore>,
) -> anyhow::Result<()> {
    match command {
        Commands::Login { email, google_token } => {
            let mut session = new_session(config, tokens)?;
            let identity = match google_token {
                Some(token) => session
                    .sign_in_with_provider(SocialProvider::Google, &token)
                    .await?
                    .clone(),
                None => {
                    let (email, password) = prompt_credentials(email, false)?;
                    session.sign_in(&email, &password).await?.clone()
                }
            };
            println!("Вход выполнен: {}", identity.email);
            println!("Длительность сессии: {}", format_elapsed(session.elapsed_session_time()));
        }
        Commands::Signup { email } => {
            let mut session = new_session(config, tokens)?;
            let (email, password) = prompt_credentials(email, true)?;
            let identity = session.sign_up(&email, &password).await?.clone();
            println!("Аккаунт создан: {}", identity.email);
        }
        Commands::Logout => {
            let mut session = new_session(config, tokens)?;
            session.teardown().await?;
            println!("Сессия завершена");
        }
        Commands::Whoami => {
            if tokens.load()?.is_none() {
                println!("Вход не выполнен");
                return Ok(());
            }
            let profile = state.api.profile().await?;
            println!("{} <{}>", profile.user.name, profile.user.email);
        }
        Commands::History {
            search,
            trend,
            sentiment,
            sort,
            direction,
            csv,
        } => {
            let history = &state.history;
            history.load().await?;
            history.set_filter(&search, trend, sentiment).await;
            history.sort_by(sort, direction).await;

            let visible = history.visible().await?;
            for record in &visible {
                print_record_line(record);
            }
            let (shown, total) = history.counts().await?;
            println!("Показано {} из {}", shown, total);

            if let Some(path) = csv {
                let path = output_path(path, || csv_file_name(Utc::now()));
                tokio::fs::write(&path, history.export_csv().await?).await?;
                println!("CSV сохранён: {}", path.display());
            }
        }
        Commands::Delete { id, yes } => {
            let history = &state.history;
            history.load().await?;
            let confirm = |prompt: &str| {
                yes || Confirm::new()
                    .with_prompt(prompt)
                    .default(false)
                    .interact()
                    .unwrap_or(false)
            };
            match history.delete(&id, &confirm).await? {
                DeleteOutcome::Deleted(record) => println!("Удалён анализ {}", record.product),
                DeleteOutcome::Cancelled => println!("Удаление отменено"),
            }
        }
        Commands::Compare {
            products,
            json,
            report,
        } => {
            let mut selection = ComparisonSelection::new();
            for name in &products {
                if selection.add(name)? == SelectionChange::LimitReached {
                    eprintln!("{} пропущен: можно сравнить не более пяти продуктов", name);
                }
            }

            let comparison = state.comparison.fetch_comparison(selection.names()).await?;
            if json {
                println!("{}", comparison_report_json(&comparison.records)?);
            } else {
                for row in &comparison.metrics {
                    let cells: Vec<String> = row
                        .values
                        .iter()
                        .map(|v| format!("{}={}", v.product, v.value))
                        .collect();
                    println!("{:<18} {}", row.name, cells.join("  "));
                }
                if let Some(winner) = &comparison.insights.winner {
                    println!("Лидер: {}", winner);
                }
                for recommendation in &comparison.insights.recommendations {
                    println!("- {}", recommendation);
                }
            }

            if let Some(path) = report {
                let bytes = state.comparison.export_report(selection.names()).await?;
                tokio::fs::write(&path, bytes).await?;
                println!("Отчёт сохранён: {}", path.display());
            }
        }
        Commands::Analyze {
            product,
            time_range,
            sources,
            report,
        } => {
            let sources = (!sources.is_empty()).then_some(sources);
            let record = state
                .analysis
                .analyze(&product, time_range.as_deref(), sources.as_deref())
                .await?;

            print_record_line(&record);
            let insights = analysis_insights(&record);
            for finding in &insights.key_findings {
                println!("* {}", finding);
            }
            for recommendation in &insights.recommendations {
                println!("- {}", recommendation);
            }
            for risk in &insights.risk_factors {
                println!("! {}", risk);
            }

            if let Some(path) = report {
                let path = output_path(path, || report_file_name(&record.product));
                tokio::fs::write(&path, analysis_report_json(&record)?).await?;
                println!("Отчёт сохранён: {}", path.display());
            }
        }
        Commands::Profile => {
            let profile = state.api.profile().await?;
            println!("{} <{}>", profile.user.name, profile.user.email);
            println!("План: {} ({})", profile.user.plan, profile.user.status);
            println!(
                "Анализов: {}, продуктов: {}, отчётов: {}, точность: {:.1}%",
                profile.stats.analyses,
                profile.stats.products,
                profile.stats.reports,
                profile.stats.accuracy
            );
            for achievement in profile.achievements.iter().filter(|a| a.earned) {
                println!("+ {}", achievement.title);
            }
        }
        Commands::Dashboard => {
            state.history.load().await?;
            let records = state.history.holder().get().await?;
            let now = Utc::now();

            let metrics = dashboard_metrics(&records, now);
            println!(
                "Анализов: {}, растущих трендов: {}, средняя уверенность: {}%, данных: {}",
                metrics.total_analyses,
                metrics.positive_trends,
                metrics.avg_confidence,
                format_magnitude(metrics.total_data_points)
            );
            println!("Изменение за неделю: {}%", metrics.growth_rate);
            for product in trending_products(&records, 5) {
                println!("{:>3}  {:?}  {}", product.score, product.trend, product.product);
            }
            for day in weekly_activity(&records, now) {
                println!("{}  {}", day.day, day.analyses);
            }
        }
        Commands::Status { watch } => {
            if !watch {
                let snapshot = status::snapshot(&state.api).await;
                println!("Бэкенд: {}", snapshot.backend);
                println!("Уведомлений: {}", snapshot.notifications);
                return Ok(());
            }

            let mut receiver = state.status.subscribe();
            state
                .status
                .start(Duration::from_secs(config.health_check_interval_secs))
                .await;
            loop {
                tokio::select! {
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = receiver.borrow_and_update().clone();
                        println!("Бэкенд: {}, уведомлений: {}", snapshot.backend, snapshot.notifications);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            state.status.stop().await;
        }
    }
    Ok(())
}

fn new_session(config: &AppConfig, tokens: Arc<dyn TokenStore>) -> anyhow::Result<Session> {
    let provider = RestIdentityProvider::new(config)?;
    Ok(Session::init(Arc::new(provider), tokens))
}

fn prompt_credentials(email: Option<String>, confirm: bool) -> anyhow::Result<(String, String)> {
    let email = match email {
        Some(email) => email,
        None => Input::new().with_prompt("Email").interact_text()?,
    };
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok((email, prompt.interact()?))
}

/// Пустой аргумент означает имя файла по умолчанию.
fn output_path(arg: String, default_name: impl FnOnce() -> String) -> PathBuf {
    if arg.trim().is_empty() {
        PathBuf::from(default_name())
    } else {
        PathBuf::from(arg)
    }
}

fn print_record_line(record: &AnalysisRecord) {
    println!(
        "{:<12} {:<24} {:<22} {:<9} {:>3}%  {:<7} {:>3}",
        record.id,
        record.product,
        format_analysis_date(record),
        record.sentiment.overall_sentiment.as_str(),
        percent(record.sentiment.confidence_score),
        record.trend_prediction.predicted_trend.as_str(),
        record_opportunity_score(record)
    );
}
