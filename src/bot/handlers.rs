use anyhow::{Context as AnyhowContext, Result};
use serenity::{
    builder::{CreateAttachment, CreateMessage, EditMessage},
    model::channel::Message,
    prelude::Context,
};
use tracing::info;

use crate::bot::OpenClipBot;
use crate::downloader::extractor::Platform;
use crate::downloader::DownloadError;

/// Procesa un enlace de video: descarga (o saca del caché) y responde con
/// el archivo adjunto.
pub async fn process_link(
    ctx: &Context,
    msg: &Message,
    bot: &OpenClipBot,
    platform: Platform,
    url: &str,
) -> Result<()> {
    info!(
        "📩 Enlace de {} recibido de {} ({})",
        platform, msg.author.name, url
    );

    let mut processing = msg
        .channel_id
        .say(&ctx.http, "⏳ Descargando video... Esto puede tardar un momento.")
        .await
        .context("no se pudo enviar el mensaje de progreso")?;

    // La canalización es síncrona: fuera del runtime del gateway
    let downloader = bot.downloader.clone();
    let owned_url = url.to_string();
    let outcome = tokio::task::spawn_blocking(move || downloader.obtain(platform, &owned_url)).await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            // El hilo de descarga murió; al usuario nunca le llega el detalle
            tracing::error!("Tarea de descarga abortada: {:?}", e);
            Err(DownloadError::InternalBridgeFailure(
                "Error procesando la descarga. Inténtalo de nuevo más tarde.".to_string(),
            ))
        }
    };

    match result {
        Ok(path) => match send_video(ctx, msg, &path).await {
            Ok(()) => {
                // El video ya salió; el mensaje de progreso sobra
                if let Err(e) = processing.delete(&ctx.http).await {
                    tracing::warn!("No se pudo borrar el mensaje de progreso: {:?}", e);
                }
            }
            Err(e) => {
                tracing::error!("Error enviando el video {}: {:?}", path.display(), e);
                processing
                    .edit(
                        ctx,
                        EditMessage::new().content(
                            "❌ Error: el video se descargó pero no se pudo enviar. \
                             Puede que supere el límite de tamaño de Discord.",
                        ),
                    )
                    .await
                    .context("no se pudo editar el mensaje de progreso")?;
            }
        },
        Err(error) => {
            processing
                .edit(
                    ctx,
                    EditMessage::new().content(format!("❌ Error: {}", render_error(&error))),
                )
                .await
                .context("no se pudo editar el mensaje de progreso")?;
        }
    }

    Ok(())
}

async fn send_video(ctx: &Context, msg: &Message, path: &std::path::Path) -> Result<()> {
    let attachment = CreateAttachment::path(path)
        .await
        .context("no se pudo leer el video descargado")?;

    msg.channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .add_file(attachment)
                .reference_message(msg),
        )
        .await
        .context("no se pudo enviar el video")?;

    Ok(())
}

/// Convierte un [`DownloadError`] en el texto que ve el usuario
pub fn render_error(error: &DownloadError) -> String {
    match error {
        DownloadError::InvalidUrl(parse) => match parse.platform {
            Platform::Instagram => "Formato de URL de Instagram no válido. Formato esperado: \
                https://www.instagram.com/p/SHORTCODE/ o https://www.instagram.com/reel/SHORTCODE/"
                .to_string(),
            Platform::TikTok => {
                "Formato de URL de TikTok no válido. No se pudo extraer el id del video."
                    .to_string()
            }
            Platform::YouTube => "Formato de URL de YouTube no válido. Se aceptan enlaces \
                watch, youtu.be y shorts."
                .to_string(),
        },
        DownloadError::UpstreamFetchFailed { platform, reason } => {
            format!("no se pudo descargar el video de {platform}: {reason}")
        }
        DownloadError::NoVideoPresent => "la publicación no contiene un video.".to_string(),
        DownloadError::StorageFailure(_) => {
            "no se pudo guardar el video. Inténtalo de nuevo.".to_string()
        }
        DownloadError::InternalBridgeFailure(message) => message.clone(),
    }
}

pub fn usage_text() -> &'static str {
    "¡Hola! Soy un bot para descargar videos. Mándame un enlace de Instagram, \
     TikTok o YouTube y te devuelvo el video.\n\n\
     También puedes usar el comando `!download` seguido de un enlace:\n\
     `!download https://www.instagram.com/reel/SHORTCODE/`\n\
     `!download https://www.youtube.com/watch?v=VIDEO_ID`\n\n\
     Plataformas soportadas:\n\
     - Instagram (posts y reels)\n\
     - TikTok\n\
     - YouTube (videos y shorts)"
}

pub fn unsupported_text() -> &'static str {
    "Mándame un enlace de una plataforma soportada.\n\n\
     Plataformas soportadas:\n\
     - Instagram (posts y reels)\n\
     - TikTok\n\
     - YouTube (videos y shorts)"
}
