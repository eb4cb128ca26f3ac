use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use open_music_queue::audio::songbird_sink::SongbirdGateway;
use open_music_queue::bot::{announce::spawn_announcer, QueueBot};
use open_music_queue::config::Config;
use open_music_queue::sources::{CatalogProvider, SpotifyClient, YtDlpClient};
use open_music_queue::{EventBroadcaster, RegistrySettings, SessionRegistry, TrackResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_queue=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music Queue v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    let broadcaster = EventBroadcaster::new(config.event_buffer);
    let http = reqwest::Client::new();

    // Resolución: yt-dlp siempre, Spotify solo con credenciales
    let primary = Arc::new(YtDlpClient::new(config.ytdlp_path.clone()));
    let catalog = config.spotify_credentials().map(|(id, secret)| {
        info!("🎧 Catálogo de Spotify habilitado");
        Arc::new(SpotifyClient::new(http.clone(), id, secret)) as Arc<dyn CatalogProvider>
    });
    if catalog.is_none() {
        warn!("Spotify sin credenciales: los enlaces de Spotify se buscarán como texto");
    }
    let resolver = Arc::new(TrackResolver::new(primary, catalog, config.search_limit));

    let songbird = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(songbird.clone(), http));
    let registry = Arc::new(SessionRegistry::new(
        gateway,
        resolver,
        broadcaster.clone(),
        RegistrySettings::from(&config),
    ));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(QueueBot::new(registry.clone()))
        .register_songbird_with(songbird)
        .await?;

    let token = CancellationToken::new();
    let stats_task = registry.spawn_stats_reporter(config.stats_interval(), token.clone());
    let announcer = spawn_announcer(
        client.http.clone(),
        registry.clone(),
        broadcaster.subscribe(),
        token.clone(),
    );

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let shutdown_registry = registry.clone();
    let shutdown_token = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");

        shutdown_token.cancel();
        let closed = shutdown_registry.cleanup(None).await;
        info!("🧹 {} sesiones cerradas antes de salir", closed);
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    token.cancel();
    let _ = tokio::join!(stats_task, announcer);
    info!(
        "👋 Open Music Queue detenido tras {}",
        humantime::format_duration(std::time::Duration::from_secs(registry.stats().uptime_secs))
    );

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: {}", config.ytdlp_path);
    }
}
