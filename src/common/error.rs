use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Taxonomia única de erros do núcleo. Os adaptadores de armazenamento
// convertem violações de constraint em InvalidState/NotFound na fronteira.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0} não encontrado")]
    NotFound(String),

    #[error("Operação inválida no estado atual: {0}")]
    InvalidState(String),

    #[error("Quantidade ou valor inválido: {0}")]
    InvalidQuantity(String),

    #[error("Acesso negado a {0}")]
    Forbidden(String),

    #[error("Falha no serviço externo: {0}")]
    UpstreamService(String),

    #[error("Aguarde {retry_after_secs}s antes de reenviar a proposta")]
    SendThrottled { retry_after_secs: i64 },

    #[error("Token inválido")]
    InvalidToken,

    #[error("Assinatura do webhook inválida")]
    InvalidSignature,

    #[error("Corpo da requisição inválido: {0}")]
    MalformedPayload(String),

    // Variante para erros de banco de dados (conexão, pool, protocolo)
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("{} {}", entity, id))
    }

    pub fn forbidden(entity: &str, id: impl std::fmt::Display) -> Self {
        AppError::Forbidden(format!("{} {}", entity, id))
    }

    /// Traduz erros do sqlx para a taxonomia do domínio.
    /// Violação de unicidade vira InvalidState, de chave estrangeira vira NotFound.
    pub fn from_storage(e: sqlx::Error, context: &str) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound(context.to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::InvalidState(format!("{} já existe", context))
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(format!("Referência de {}", context))
            }
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                AppError::InvalidState(format!("Restrição violada em {}", context))
            }
            _ => AppError::DatabaseError(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors.iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::SendThrottled { retry_after_secs } => {
                let body = Json(json!({
                    "error": self.to_string(),
                    "retryAfterSecs": retry_after_secs,
                }));
                return (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::InvalidState(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::InvalidQuantity(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::UpstreamService(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticação inválido ou ausente.".to_string(),
            ),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            // DatabaseError e InternalServerError viram 500.
            // O `tracing` loga a mensagem detalhada que `thiserror` nos deu.
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                tracing::error!(error = ?self, "Erro Interno do Servidor");
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.".to_string())
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        let cases = [
            (AppError::not_found("Agendamento", 1), StatusCode::NOT_FOUND),
            (AppError::InvalidState("x".into()), StatusCode::CONFLICT),
            (AppError::InvalidQuantity("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::forbidden("Item", 2), StatusCode::FORBIDDEN),
            (AppError::UpstreamService("pix".into()), StatusCode::BAD_GATEWAY),
            (AppError::SendThrottled { retry_after_secs: 30 }, StatusCode::TOO_MANY_REQUESTS),
            (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err = AppError::from_storage(sqlx::Error::RowNotFound, "Proposta");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
