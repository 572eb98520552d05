use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use clinica_core::constants::DEFAULT_HISTORY_WINDOW_DAYS;
use clinica_core::store::{collect_stats, InMemoryAppointmentStore};
use clinica_core::{
    CidCode, DemandRequest, HeuristicPredictor, NoShowQuery, PatientId, PredictionTables,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinica")]
#[command(about = "Clinic no-show risk and demand forecasting CLI")]
struct Cli {
    /// Prediction tables YAML (default: embedded tables)
    #[arg(long, global = true)]
    tables: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the no-show probability for one appointment
    PredictFalta {
        /// Patient id
        patient_id: PatientId,
        /// Appointment date (YYYY-MM-DD)
        date: NaiveDate,
        /// Appointment time (HH:MM)
        #[arg(long)]
        time: Option<NaiveTime>,
        /// Apply December and holiday adjustments
        #[arg(long)]
        seasonal: bool,
        /// Appointment store seed JSON used for patient history (optional)
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Forecast daily demand over an inclusive date range
    Forecast {
        /// First day (YYYY-MM-DD)
        start: NaiveDate,
        /// Last day (YYYY-MM-DD)
        end: NaiveDate,
        /// CID-10 diagnosis echoed in the forecast (optional)
        #[arg(long)]
        diagnosis: Option<CidCode>,
    },
    /// Print the seasonal reference factors
    Seasonal,
    /// Load and validate the prediction tables
    CheckTables,
}

fn run(
    command: Commands,
    tables: Option<PathBuf>,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let tables = Arc::new(PredictionTables::load(tables.as_deref())?);
    let predictor = HeuristicPredictor::new(tables.clone(), None);

    let value = match command {
        Commands::PredictFalta {
            patient_id,
            date,
            time,
            seasonal,
            seed,
        } => {
            let stats = match seed {
                Some(path) => {
                    let store = InMemoryAppointmentStore::from_seed_file(&path)?;
                    let today = Utc::now().date_naive();
                    Some(collect_stats(
                        &store,
                        patient_id,
                        DEFAULT_HISTORY_WINDOW_DAYS,
                        today,
                    )?)
                }
                None => None,
            };
            let mut query = NoShowQuery::new(patient_id, date).with_seasonal_adjustment(seasonal);
            query.target_time = time;
            serde_json::to_value(predictor.estimate_no_show(&query, stats.as_ref())?)?
        }
        Commands::Forecast {
            start,
            end,
            diagnosis,
        } => {
            let request = DemandRequest {
                start,
                end,
                diagnosis,
            };
            serde_json::to_value(predictor.forecaster().forecast(&request)?)?
        }
        Commands::Seasonal => serde_json::to_value(predictor.forecaster().seasonal_analysis())?,
        Commands::CheckTables => serde_json::json!({
            "version": tables.version,
            "holidays": tables.holidays.as_ref().map_or(0, Vec::len),
            "diagnoses": tables.demand.diagnoses.len(),
            "valid": true,
        }),
    };
    Ok(value)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(command) => {
            let value = run(command, cli.tables)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => {
            println!("Use 'clinica --help' for commands");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_predict_falta_without_history() {
        let cli = Cli::parse_from([
            "clinica",
            "predict-falta",
            "3",
            "2025-11-03",
            "--time",
            "07:00:00",
        ]);
        let value = run(cli.command.expect("command"), cli.tables).expect("prediction");
        assert_eq!(value["probabilidade_falta"], 0.29);
        assert_eq!(value["nivel_risco"], "baixo");
    }

    #[test]
    fn test_predict_falta_with_seed_history() {
        let mut seed = tempfile::NamedTempFile::new().expect("temp file");
        let today = Utc::now().date_naive();
        let missed = today - chrono::Duration::days(3);
        write!(
            seed,
            r#"{{
                "patients": [{{"id": 5, "name": "Paciente 5"}}],
                "appointments": [
                    {{"id": 1, "patient_id": 5, "date": "{missed}", "status": "faltou"}}
                ]
            }}"#
        )
        .expect("write seed");

        let path = seed.path().to_string_lossy().to_string();
        let cli = Cli::parse_from([
            "clinica",
            "predict-falta",
            "5",
            "2025-11-04",
            "--seed",
            path.as_str(),
        ]);
        let value = run(cli.command.expect("command"), cli.tables).expect("prediction");
        assert_eq!(value["probabilidade_falta"], 0.55);
        assert_eq!(value["fatores_risco"][0], "Histórico de faltas elevado");
    }

    #[test]
    fn test_forecast_and_check_tables() {
        let cli = Cli::parse_from(["clinica", "forecast", "2025-11-03", "2025-11-03"]);
        let value = run(cli.command.expect("command"), cli.tables).expect("forecast");
        assert_eq!(value["predicted_appointments"], 15);

        let cli = Cli::parse_from(["clinica", "check-tables"]);
        let value = run(cli.command.expect("command"), cli.tables).expect("tables");
        assert_eq!(value["version"], "2025.10-v1");
        assert_eq!(value["valid"], true);
    }

    #[test]
    fn test_missing_tables_file_is_an_error() {
        let cli = Cli::parse_from(["clinica", "--tables", "/nonexistent/tables.yaml", "seasonal"]);
        assert!(run(cli.command.expect("command"), cli.tables).is_err());
    }
}
