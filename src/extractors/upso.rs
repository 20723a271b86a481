//! UPSO study plan via the Guarani student portal.
//!
//! Logs into the university's Guarani 3W instance, opens the study plan page
//! and parses the subjects table. Guarani deployments differ in column order,
//! so columns are mapped by header keywords instead of position.

use crate::record::{self, RawRecord};
use crate::registry::Extractor;
use crate::secrets::Secrets;
use crate::session::{Session, SessionKind};
use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

const BASE_URL: &str = "https://guarani3w.upso.edu.ar/guarani3w";

/// One subject row from the study plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codigo: Option<String>,
    pub nombre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estado: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub periodo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creditos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlativas: Option<String>,
}

pub struct UpsoStudyPlan;

#[async_trait]
impl Extractor for UpsoStudyPlan {
    fn name(&self) -> &'static str {
        "upso"
    }

    fn description(&self) -> &'static str {
        "Study plan progress from the UPSO Guarani portal"
    }

    fn required_secrets(&self) -> &'static [&'static str] {
        &["upso.usuario", "upso.clave"]
    }

    fn optional_settings(&self) -> &'static [&'static str] {
        &["upso.base_url", "upso.login_wait_ms"]
    }

    fn session_kind(&self) -> SessionKind {
        SessionKind::Browser
    }

    async fn run(&self, session: &mut Session, secrets: &Secrets) -> Result<Vec<RawRecord>> {
        let browser = session.browser()?;
        let usuario = secrets.require("upso.usuario")?.to_string();
        let clave = secrets.require("upso.clave")?.to_string();
        let base = secrets
            .get_or("upso.base_url", BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let login_wait = secrets.get_int("upso.login_wait_ms", 20_000).max(1_000) as u64;

        browser
            .navigate(&format!("{base}/acceso/login"), 30_000)
            .await?;
        browser
            .wait_for_selector("input[name='usuario']", login_wait)
            .await
            .context("Guarani login form did not appear")?;
        browser.type_into("input[name='usuario']", &usuario).await?;
        browser.type_into("input[name='password']", &clave).await?;
        browser.click("input[type='submit'], button[type='submit']").await?;

        // The student home redirect confirms the credentials.
        browser
            .wait_for_url_contains("inicio_alumno", login_wait)
            .await
            .context("login did not reach the student home page")?;
        debug!("logged in, opening study plan");

        browser
            .navigate(&format!("{base}/plan_estudio"), 30_000)
            .await?;
        browser
            .wait_for_selector("table", login_wait)
            .await
            .context("study plan table did not render")?;

        let html = browser.html().await?;
        let items = parse_plan(&html);
        ensure!(!items.is_empty(), "study plan page has no subject rows");
        debug!("parsed {} plan row(s)", items.len());

        record::to_raw(&items)
    }
}

/// Column roles recognized in the plan table header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Codigo,
    Nombre,
    Estado,
    Tipo,
    Anio,
    Periodo,
    Creditos,
    Correlativas,
    Unknown,
}

fn classify_header(header: &str) -> Column {
    let h = header.to_lowercase();
    if h.contains("digo") || h.starts_with("cod") {
        Column::Codigo
    } else if h.contains("materia") || h.contains("actividad") || h.contains("nombre") {
        Column::Nombre
    } else if h.contains("estado") || h.contains("situaci") {
        Column::Estado
    } else if h.contains("tipo") || h.contains("car") && h.contains("cter") {
        Column::Tipo
    } else if h.contains("o/nivel") || h == "año" || h == "anio" || h.contains("nivel") {
        Column::Anio
    } else if h.contains("per") && h.contains("odo") || h.contains("cuatrim") {
        Column::Periodo
    } else if h.contains("cr") && h.contains("dito") || h.contains("horas") {
        Column::Creditos
    } else if h.contains("correlat") {
        Column::Correlativas
    } else {
        Column::Unknown
    }
}

/// Parse the subjects table. The first table whose header yields a name
/// column wins.
fn parse_plan(html: &str) -> Vec<PlanItem> {
    let document = Html::parse_document(html);
    let Ok(table_sel) = Selector::parse("table.table, table") else {
        return Vec::new();
    };

    for table in document.select(&table_sel) {
        let columns = header_columns(&table);
        if !columns.contains(&Column::Nombre) {
            continue;
        }
        let items = table_rows(&table, &columns);
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}

fn header_columns(table: &ElementRef<'_>) -> Vec<Column> {
    let Ok(th_sel) = Selector::parse("thead th, tr th") else {
        return Vec::new();
    };
    table
        .select(&th_sel)
        .map(|th| classify_header(th.text().collect::<String>().trim()))
        .collect()
}

fn table_rows(table: &ElementRef<'_>, columns: &[Column]) -> Vec<PlanItem> {
    let Ok(tr_sel) = Selector::parse("tbody tr, tr") else {
        return Vec::new();
    };
    let Ok(td_sel) = Selector::parse("td") else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for row in table.select(&tr_sel) {
        let cells: Vec<String> = row
            .select(&td_sel)
            .map(|td| {
                td.text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        if cells.is_empty() {
            continue;
        }

        let mut item = PlanItem {
            codigo: None,
            nombre: String::new(),
            estado: None,
            tipo: None,
            anio: None,
            periodo: None,
            creditos: None,
            correlativas: None,
        };
        for (cell, column) in cells.iter().zip(columns.iter()) {
            let value = cell.trim();
            if value.is_empty() || value == "-" {
                continue;
            }
            match column {
                Column::Codigo => item.codigo = Some(value.to_string()),
                Column::Nombre => item.nombre = value.to_string(),
                Column::Estado => item.estado = Some(value.to_string()),
                Column::Tipo => item.tipo = Some(value.to_string()),
                Column::Anio => item.anio = Some(value.to_string()),
                Column::Periodo => item.periodo = Some(value.to_string()),
                Column::Creditos => item.creditos = Some(value.to_string()),
                Column::Correlativas => item.correlativas = Some(value.to_string()),
                Column::Unknown => {}
            }
        }

        if item.nombre.is_empty() {
            continue;
        }
        // Some deployments render "Nombre (Codigo)" in a single cell
        if item.codigo.is_none() {
            if let Some((nombre, codigo)) = split_materia_info(&item.nombre) {
                item.nombre = nombre;
                item.codigo = Some(codigo);
            }
        }
        items.push(item);
    }
    items
}

/// Split "Algoritmos y Programacion (TI021)" into name and code.
fn split_materia_info(cell: &str) -> Option<(String, String)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(.*\S)\s*\(([A-Za-z0-9.\-]+)\)\s*$").expect("valid regex")
    });
    let caps = re.captures(cell)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
        <html><body>
        <table class="table">
          <thead>
            <tr>
              <th>Código</th><th>Materia</th><th>Estado</th>
              <th>Año/Nivel</th><th>Período</th><th>Correlativas</th>
            </tr>
          </thead>
          <tbody>
            <tr>
              <td>TI021</td><td>Algoritmos y Programacion</td><td>Aprobada</td>
              <td>1</td><td>1er cuatrimestre</td><td>-</td>
            </tr>
            <tr>
              <td>TI034</td><td>Base de Datos</td><td>En curso</td>
              <td>2</td><td>2do cuatrimestre</td><td>TI021</td>
            </tr>
          </tbody>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_plan_maps_columns_by_header() {
        let items = parse_plan(PLAN);
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].codigo.as_deref(), Some("TI021"));
        assert_eq!(items[0].nombre, "Algoritmos y Programacion");
        assert_eq!(items[0].estado.as_deref(), Some("Aprobada"));
        assert_eq!(items[0].anio.as_deref(), Some("1"));
        // "-" means no prerequisites
        assert_eq!(items[0].correlativas, None);

        assert_eq!(items[1].correlativas.as_deref(), Some("TI021"));
    }

    #[test]
    fn test_parse_combined_name_and_code_cell() {
        let html = r#"
            <table>
              <tr><th>Actividad</th><th>Estado</th></tr>
              <tr><td>Redes de Computadoras (TI045)</td><td>Regular</td></tr>
            </table>
        "#;
        let items = parse_plan(html);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].nombre, "Redes de Computadoras");
        assert_eq!(items[0].codigo.as_deref(), Some("TI045"));
        assert_eq!(items[0].estado.as_deref(), Some("Regular"));
    }

    #[test]
    fn test_header_classification() {
        assert_eq!(classify_header("Código"), Column::Codigo);
        assert_eq!(classify_header("Materia"), Column::Nombre);
        assert_eq!(classify_header("Año/Nivel"), Column::Anio);
        assert_eq!(classify_header("Créditos"), Column::Creditos);
        assert_eq!(classify_header("Observaciones"), Column::Unknown);
    }

    #[test]
    fn test_ignores_tables_without_name_column() {
        let html = r#"
            <table><tr><th>Fecha</th><th>Sala</th></tr>
            <tr><td>2026-08-24</td><td>A1</td></tr></table>
        "#;
        assert!(parse_plan(html).is_empty());
    }
}
