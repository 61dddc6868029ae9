//! Command dispatcher: maps inbound text commands, scoped to their
//! originating destination, onto store and resolver operations.
//!
//! Stateless request/response: every mutating command persists (through the
//! store) before the success reply goes out, so an acknowledgment implies
//! durability. Non-command chatter gets no reply at all.

use crate::channels::types::{ChatPlatform, IncomingMessage};
use crate::error::BotError;
use crate::resolver::ChannelResolver;
use crate::scheduler::compose_greeting;
use crate::store::{self, BirthdayRecord, BirthdayStore, ReminderMeta};
use chrono::{Datelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

pub struct CommandDispatcher {
    store: Arc<BirthdayStore>,
    resolver: Arc<ChannelResolver>,
    platform: Arc<dyn ChatPlatform>,
    tz: Tz,
}

impl CommandDispatcher {
    pub fn new(
        store: Arc<BirthdayStore>,
        resolver: Arc<ChannelResolver>,
        platform: Arc<dyn ChatPlatform>,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            resolver,
            platform,
            tz,
        }
    }

    /// Handle one inbound message; `None` means no reply is warranted.
    pub async fn dispatch(&self, msg: &IncomingMessage) -> Option<String> {
        let current_year = Utc::now().with_timezone(&self.tz).year();
        self.dispatch_at(msg, current_year).await
    }

    /// Like [`dispatch`](Self::dispatch) with an injected current year, so
    /// tests can pin the delivered/pending annotations.
    pub async fn dispatch_at(&self, msg: &IncomingMessage, current_year: i32) -> Option<String> {
        let text = msg.text.trim();
        if !text.starts_with('!') {
            return None;
        }

        log::info!(
            "[COMMANDS] {} in '{}': {}",
            msg.sender_name,
            msg.chat_name,
            text
        );

        match text {
            "!ping" => return Some("🏓 ¡Estoy activo!".to_string()),
            "!help" | "!ayuda" => return Some(help_text()),
            "!listar" => return Some(self.handle_list(msg, current_year)),
            "!actualizar" => return Some(self.handle_refresh().await),
            _ => {}
        }

        if let Some(rest) = text.strip_prefix("!agregar") {
            return Some(self.handle_add(msg, rest.trim()));
        }
        if let Some(rest) = text.strip_prefix("!borrar") {
            return Some(self.handle_delete(msg, rest.trim()));
        }
        if let Some(rest) = text.strip_prefix("!forzar") {
            return Some(self.handle_force(msg, rest.trim(), current_year).await);
        }

        // Unknown ! commands are ignored, matching chatter
        None
    }

    /// `!agregar DD-MM Nombre... [| mensaje personalizado]`
    fn handle_add(&self, msg: &IncomingMessage, args: &str) -> String {
        let (entry, custom_message) = match args.split_once('|') {
            Some((left, right)) => (left.trim(), Some(right.trim())),
            None => (args, None),
        };

        let mut parts = entry.split_whitespace();
        let Some(date) = parts.next() else {
            return "❌ Formato incorrecto. Usá: !agregar DD-MM Nombre Apellido".to_string();
        };
        let name = parts.collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return "❌ Formato incorrecto. Usá: !agregar DD-MM Nombre Apellido".to_string();
        }
        if !store::is_valid_date(date) {
            return "❌ Formato de fecha incorrecto. Usá: DD-MM (ejemplo: 17-10)".to_string();
        }

        let record = BirthdayRecord {
            name: name.clone(),
            date: date.to_string(),
            group_id: Some(msg.chat_id.clone()),
            group_name: msg.chat_name.clone(),
            message: custom_message
                .filter(|m| !m.is_empty())
                .map(|m| m.to_string()),
            meta: ReminderMeta::default(),
        };

        match self.store.insert(record) {
            Ok(()) => format!(
                "✅ Cumpleaños agregado:\n🧍 {}\n📅 {}\n👥 {}\n⏳ Estado: Pendiente",
                name, date, msg.chat_name
            ),
            Err(BotError::Duplicate) => "⚠️ Ese cumpleaños ya está registrado.".to_string(),
            Err(e) => format!("❌ No se pudo guardar el cumpleaños: {}", e),
        }
    }

    /// `!listar` — destination-scoped, sorted by (month, day).
    fn handle_list(&self, msg: &IncomingMessage, current_year: i32) -> String {
        let mut records = self.store.in_group(&msg.chat_id);
        if records.is_empty() {
            return "📭 No hay cumpleaños registrados en este grupo.".to_string();
        }

        records.sort_by_key(|r| month_day(&r.date));

        let mut sent_count = 0usize;
        let lines: Vec<String> = records
            .iter()
            .map(|r| {
                match r.meta.last_reminder_year {
                    Some(year) if year == current_year => {
                        sent_count += 1;
                        format!("✅ {} - {} (enviado {})", r.name, r.date, year)
                    }
                    Some(year) => format!("⏳ {} - {} (último: {})", r.name, r.date, year),
                    None => format!("⏳ {} - {}", r.name, r.date),
                }
            })
            .collect();

        format!(
            "📅 *Cumpleaños del grupo* ({})\n\n{}\n\n✅ Enviados: {}\n⏳ Pendientes: {}",
            current_year,
            lines.join("\n"),
            sent_count,
            records.len() - sent_count
        )
    }

    /// `!borrar Nombre...`
    fn handle_delete(&self, msg: &IncomingMessage, name: &str) -> String {
        if name.is_empty() {
            return "❌ Debes especificar un nombre. Ejemplo: !borrar Juan Pérez".to_string();
        }
        match self.store.delete(&msg.chat_id, name) {
            Ok(removed) => format!(
                "🗑️ Se eliminó el cumpleaños de {} en \"{}\".",
                removed.name, msg.chat_name
            ),
            Err(BotError::NotFound) => "❌ No se encontró ese nombre en este grupo.".to_string(),
            Err(e) => format!("❌ No se pudo eliminar el cumpleaños: {}", e),
        }
    }

    /// `!forzar Nombre...` — reset the delivered year, then send immediately
    /// and re-mark for the current year. The only path that bypasses the
    /// once-per-year guard.
    async fn handle_force(&self, msg: &IncomingMessage, name: &str, current_year: i32) -> String {
        if name.is_empty() {
            return "❌ Debes especificar un nombre. Ejemplo: !forzar Juan Pérez".to_string();
        }
        let Some(mut record) = self.store.find_in_group(&msg.chat_id, name) else {
            return "❌ No se encontró ese nombre en este grupo.".to_string();
        };

        if record.meta.last_reminder_year.is_some() {
            if let Err(e) = self.store.reset_delivery(&record) {
                log::error!("[COMMANDS] Failed to reset delivery for {}: {}", record.name, e);
                return "❌ Error al actualizar el registro. Ver logs para detalles.".to_string();
            }
        }

        let destination = match self.resolver.resolve(&mut record).await {
            Ok(destination) => destination,
            Err(e) => {
                log::warn!("[COMMANDS] {}", e);
                return format!(
                    "❌ No se pudo resolver el grupo \"{}\" para enviar el mensaje.",
                    record.group_name
                );
            }
        };

        let text = compose_greeting(&record);
        if let Err(e) = self.platform.send_message(&destination.id, &text).await {
            log::error!("[COMMANDS] Forced send failed for {}: {}", record.name, e);
            return "❌ Error al enviar el mensaje. Ver logs para detalles.".to_string();
        }

        // The message went out; an acknowledgment still requires the new
        // state to be durable
        if let Err(e) = self.store.mark_delivered(&record, current_year) {
            log::error!("[COMMANDS] Failed to mark {} delivered: {}", record.name, e);
            return format!(
                "⚠️ Mensaje enviado para {}, pero no se pudo guardar el estado. Ver logs para detalles.",
                record.name
            );
        }

        format!("✅ Mensaje de cumpleaños forzado para {}", record.name)
    }

    /// `!actualizar` — repair stale destination identifiers across the
    /// whole collection.
    async fn handle_refresh(&self) -> String {
        match self.resolver.resolve_all().await {
            Ok(0) => "✅ Todos los identificadores de grupo están al día.".to_string(),
            Ok(n) => format!("🔁 Identificadores de grupo actualizados: {}", n),
            Err(e) => {
                log::error!("[COMMANDS] Refresh failed: {}", e);
                "❌ No se pudieron actualizar los grupos. Ver logs para detalles.".to_string()
            }
        }
    }
}

/// Sort key for `DD-MM` dates: month first, then day. Records are validated
/// at insert time, so a parse failure here only affects ordering.
fn month_day(date: &str) -> (u32, u32) {
    let mut parts = date.splitn(2, '-');
    let day = parts.next().and_then(|d| d.parse().ok()).unwrap_or(0);
    let month = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    (month, day)
}

fn help_text() -> String {
    r#"📚 *Comandos disponibles - Bot Cumpleaños*

🔍 *Comandos básicos*
!ping - Verificar si el bot está activo
!help, !ayuda - Mostrar este mensaje de ayuda

📅 *Gestión de cumpleaños*
!agregar DD-MM Nombre - Agregar un cumpleaños
  Ejemplo: !agregar 17-10 Juan Pérez
  Con mensaje propio: !agregar 17-10 Juan Pérez | ¡Felicidades!

!listar - Ver todos los cumpleaños del grupo actual
  ✅ = Ya enviado este año
  ⏳ = Pendiente

!borrar Nombre - Eliminar un cumpleaños
  Ejemplo: !borrar Juan Pérez

!forzar Nombre - Forzar reenvío del mensaje de cumpleaños
  Ejemplo: !forzar Juan Pérez

!actualizar - Reparar los identificadores de grupo"#
        .to_string()
}
