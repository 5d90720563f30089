//! # Bot Module
//!
//! Main Discord transport for Open Clip Bot.
//!
//! The bot listens for messages that contain a supported video link (or the
//! explicit `!download` command), runs the download pipeline and replies
//! with the media file. All the caching and platform logic lives in
//! [`crate::downloader`]; this module only parses messages, renders errors
//! for humans and keeps the periodic cache cleanup running.
//!
//! The download pipeline is synchronous by design, so every request is
//! pushed through [`tokio::task::spawn_blocking`] and never blocks the
//! gateway runtime.

use serenity::{
    all::{Context, EventHandler, Message, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod handlers;

use crate::config::Config;
use crate::downloader::extractor::Platform;
use crate::downloader::VideoDownloader;

/// Handler principal del bot de Discord
pub struct OpenClipBot {
    /// Configuración cargada de variables de entorno
    config: Arc<Config>,
    /// Orquestador de descargas compartido con el job de limpieza
    pub downloader: Arc<VideoDownloader>,
}

impl OpenClipBot {
    pub fn new(config: Config, downloader: Arc<VideoDownloader>) -> Self {
        Self {
            config: Arc::new(config),
            downloader,
        }
    }
}

#[async_trait]
impl EventHandler for OpenClipBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        // Iniciar el job periódico de limpieza del caché
        let config = self.config.clone();
        let downloader = self.downloader.clone();

        tokio::spawn(async move {
            maintenance_tasks(config, downloader).await;
        });
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Ignorar bots, incluido uno mismo
        if msg.author.bot {
            return;
        }

        let content = msg.content.trim().to_string();

        if content == "!start" || content == "!help" {
            if let Err(e) = msg.channel_id.say(&ctx.http, handlers::usage_text()).await {
                error!("Error enviando ayuda: {:?}", e);
            }
            return;
        }

        let (url, explicit_command) = match content.strip_prefix("!download") {
            Some(rest) => {
                let arg = rest.trim();
                if arg.is_empty() {
                    let reply = "Proporciona un enlace para descargar.\n\
                                 Ejemplo: `!download https://www.instagram.com/reel/SHORTCODE/`";
                    if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
                        error!("Error respondiendo a !download vacío: {:?}", e);
                    }
                    return;
                }
                (arg.to_string(), true)
            }
            None => (content, false),
        };

        match Platform::detect(&url) {
            Some(platform) => {
                if let Err(e) = handlers::process_link(&ctx, &msg, self, platform, &url).await {
                    error!("Error procesando enlace de {}: {:?}", platform, e);
                }
            }
            None => {
                // A un !download explícito siempre se le contesta; a los
                // mensajes sueltos solo en privado, en servidores el resto
                // del chat no es asunto nuestro
                if explicit_command || msg.guild_id.is_none() {
                    if let Err(e) = msg
                        .channel_id
                        .say(&ctx.http, handlers::unsupported_text())
                        .await
                    {
                        error!("Error respondiendo plataforma no soportada: {:?}", e);
                    }
                }
            }
        }
    }
}

/// Job de limpieza periódica del caché de videos.
///
/// Corre cada `CLEANUP_INTERVAL` durante toda la vida del proceso; un fallo
/// individual se registra y no corta el ciclo.
async fn maintenance_tasks(config: Arc<Config>, downloader: Arc<VideoDownloader>) {
    let mut interval = tokio::time::interval(config.cleanup_interval);
    // El primer tick es inmediato y la limpieza inicial ya corrió al arrancar
    interval.tick().await;

    loop {
        interval.tick().await;
        info!("🧹 Ejecutando limpieza programada del caché");

        let downloader = downloader.clone();
        match tokio::task::spawn_blocking(move || downloader.run_eviction()).await {
            Ok(removed) => {
                if removed > 0 {
                    info!("🧹 Limpieza programada: {} videos eliminados", removed);
                }
            }
            Err(e) => warn!("La limpieza programada falló: {:?}", e),
        }
    }
}
