use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::AppState;
use crate::auth::{ALL_ROLES, require_role};
use crate::models::Role;

/// A screen tab of the navigation shell.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    // chofer
    Inicio,
    Solicitudes,
    Viajes,
    Saldo,
    // operador
    Mapa,
    NuevoViaje,
    // admin
    Choferes,
    Operadores,
    Reportes,
}

const DRIVER_TABS: &[Tab] = &[Tab::Inicio, Tab::Solicitudes, Tab::Viajes, Tab::Saldo];
const OPERATOR_TABS: &[Tab] = &[Tab::Mapa, Tab::NuevoViaje, Tab::Viajes];
const ADMIN_TABS: &[Tab] = &[Tab::Mapa, Tab::Choferes, Tab::Operadores, Tab::Reportes];

pub fn tabs_for_role(role: Role) -> &'static [Tab] {
    match role {
        Role::Driver => DRIVER_TABS,
        Role::Operator => OPERATOR_TABS,
        Role::Admin => ADMIN_TABS,
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NavigationResponse {
    pub role: Role,
    pub tabs: Vec<Tab>,
}

pub async fn get_navigation(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<NavigationResponse>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &ALL_ROLES).await?;
    Ok((
        StatusCode::OK,
        Json(NavigationResponse {
            role: user.role,
            tabs: tabs_for_role(user.role).to_vec(),
        }),
    ))
}
