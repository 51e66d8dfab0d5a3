//! Maps existing fields to a form, one confirmed batch per round.
//!
//! A round is restarted on any invalid answer or lookup failure; nothing is
//! written until the user confirms the preview, and a failed insert writes
//! nothing at all.

use std::collections::HashSet;
use std::io::{BufRead, Write};

use pgseed_core::{
    canonical_id, render_preview, resolve_by_name, suggest_field_names, FormField, InputMode,
    ResolvedField,
};
use pgseed_storage::{FormCatalog, StoreError};
use tracing::{debug, info, warn};

use crate::{section, Console, WizardError};

const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingReport {
    pub forms_mapped: usize,
    pub fields_mapped: u64,
}

enum Round {
    Again,
    Stop,
}

/// Why a batch cannot be inserted. Each list holds the offending input lines.
#[derive(Debug, Default)]
struct Resolution {
    resolved: Vec<ResolvedField>,
    unresolved: Vec<(String, Vec<String>)>,
    already_mapped: Vec<String>,
    repeated: Vec<String>,
}

pub fn banner<R: BufRead, W: Write>(console: &mut Console<R, W>) -> Result<(), WizardError> {
    section(console, "       FORM FIELD MAPPING - Interactive CLI")
}

/// Runs rounds until the user stops or input ends.
pub async fn run_form_mapping<C, R, W>(
    catalog: &C,
    console: &mut Console<R, W>,
) -> Result<MappingReport, WizardError>
where
    C: FormCatalog + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut report = MappingReport::default();
    loop {
        match run_round(catalog, console, &mut report).await {
            Ok(Round::Again) => continue,
            Ok(Round::Stop) => break,
            Err(WizardError::InputClosed) => {
                debug!("input closed; leaving form mapping");
                console.say("")?;
                break;
            }
            Err(err) => return Err(err),
        }
    }
    info!(
        forms = report.forms_mapped,
        fields = report.fields_mapped,
        "form mapping finished"
    );
    Ok(report)
}

async fn run_round<C, R, W>(
    catalog: &C,
    console: &mut Console<R, W>,
    report: &mut MappingReport,
) -> Result<Round, WizardError>
where
    C: FormCatalog + ?Sized,
    R: BufRead,
    W: Write,
{
    console.say("-".repeat(60))?;
    let form_id = canonical_id(&console.prompt("Enter Form ID: ")?);
    if form_id.is_empty() {
        console.say("❌ Form ID cannot be empty.")?;
        return Ok(Round::Again);
    }

    console.say("🔄 Validating form...")?;
    match catalog.form_exists(&form_id).await {
        Ok(true) => console.say("✔ Form validated successfully!")?,
        Ok(false) => {
            console.say(format!("❌ Form with ID '{form_id}' does not exist."))?;
            return Ok(Round::Again);
        }
        Err(err) => return lookup_failed(console, "validating form", err),
    }

    let expected = match console.prompt("\nEnter number of fields to map: ")?.parse::<i64>() {
        Ok(n) if n > 0 => n as usize,
        Ok(_) => {
            console.say("❌ Number of fields must be greater than 0.")?;
            return Ok(Round::Again);
        }
        Err(_) => {
            console.say("❌ Please enter a valid number.")?;
            return Ok(Round::Again);
        }
    };

    console.say("\nHow do you want to provide fields?")?;
    console.say("1. Field ID")?;
    console.say("2. Field Name")?;
    let mode = match console.prompt("Enter your choice (1 or 2): ")?.parse::<i64>() {
        Ok(choice) => match InputMode::from_choice(choice) {
            Some(mode) => mode,
            None => {
                console.say("❌ Invalid choice. Please enter 1 or 2.")?;
                return Ok(Round::Again);
            }
        },
        Err(_) => {
            console.say("❌ Please enter a valid number.")?;
            return Ok(Round::Again);
        }
    };

    let noun = match mode {
        InputMode::FieldId => "field IDs",
        InputMode::FieldName => "field names",
    };
    console.say(format!(
        "\n--- Enter {noun} (one per line). Press ENTER twice to finish ---"
    ))?;
    let inputs = console.read_block()?;
    if inputs.len() != expected {
        console.say(format!(
            "\n❌ Expected {expected} fields, but received {}.",
            inputs.len()
        ))?;
        console.say("Please try again.")?;
        return Ok(Round::Again);
    }

    console.say("\n🔄 Resolving fields...")?;
    let resolution = match mode {
        InputMode::FieldId => resolve_by_ids(catalog, &form_id, &inputs).await,
        InputMode::FieldName => {
            let fields = match catalog.all_fields().await {
                Ok(fields) => fields,
                Err(err) => return lookup_failed(console, "fetching fields", err),
            };
            if fields.is_empty() {
                console.say("❌ Could not fetch fields from database.")?;
                return Ok(Round::Again);
            }
            resolve_by_names(catalog, &form_id, &fields, &inputs).await
        }
    };
    let resolution = match resolution {
        Ok(resolution) => resolution,
        Err(err) => return lookup_failed(console, "resolving fields", err),
    };

    if !resolution.unresolved.is_empty() {
        console.say("\n❌ The following fields could not be resolved:")?;
        for (input, suggestions) in &resolution.unresolved {
            if suggestions.is_empty() {
                console.say(format!("   - {input}"))?;
            } else {
                console.say(format!(
                    "   - {input} (did you mean: {}?)",
                    suggestions.join(", ")
                ))?;
            }
        }
        console.say("\n❌ Cannot proceed with partial data. Please try again.")?;
        return Ok(Round::Again);
    }

    if !resolution.already_mapped.is_empty() {
        console.say("\n⚠️  The following fields already have mappings for this form:")?;
        for input in &resolution.already_mapped {
            console.say(format!("   - {input}"))?;
        }
        console.say("\n❌ Duplicate mappings are not allowed. Please try again.")?;
        return Ok(Round::Again);
    }

    if !resolution.repeated.is_empty() {
        console.say("\n⚠️  The following fields appear more than once in this batch:")?;
        for input in &resolution.repeated {
            console.say(format!("   - {input}"))?;
        }
        console.say("\n❌ Each field can be mapped only once per form. Please try again.")?;
        return Ok(Round::Again);
    }

    let resolved = resolution.resolved;
    console.say(format!("\n{}", render_preview(&resolved, mode)))?;
    console.say(format!("\n📋 Total fields to map: {}", resolved.len()))?;
    console.say(format!("📋 Form ID: {form_id}"))?;
    console.say(format!(
        "📋 order_index will be assigned: 1 to {}",
        resolved.len()
    ))?;

    let confirm = console.prompt("\nDo you want to continue with these mappings? (y/n): ")?;
    if !confirm.eq_ignore_ascii_case("y") {
        console.say("\n❌ Mapping cancelled by user.")?;
        let retry = console.prompt("Do you want to try again? (y/n): ")?;
        return Ok(if retry.eq_ignore_ascii_case("y") {
            Round::Again
        } else {
            Round::Stop
        });
    }

    console.say("\n🔄 Inserting mappings...")?;
    let fields = resolved
        .iter()
        .map(|r| FormField {
            id: r.id.clone(),
            field_name: r.field_name.clone(),
        })
        .collect::<Vec<_>>();
    match catalog.insert_mappings(&form_id, &fields).await {
        Ok(inserted) => {
            report.forms_mapped += 1;
            report.fields_mapped += inserted;
            let rule = "=".repeat(60);
            console.say(format!("\n{rule}"))?;
            console.say("✔ Mapping completed successfully!")?;
            console.say(format!(
                "✔ order_index assigned automatically (1 to {inserted})"
            ))?;
            console.say("✔ Transaction committed")?;
            console.say(rule)?;
        }
        Err(err) => {
            warn!(form_id = %form_id, error = %err, "inserting mappings failed");
            console.say(format!("❌ Error inserting mappings: {err}"))?;
            console.say("❌ Transaction rolled back. No data was inserted.")?;
        }
    }

    let another = console.prompt("\nDo you want to map another form? (y/n): ")?;
    Ok(if another.eq_ignore_ascii_case("y") {
        Round::Again
    } else {
        Round::Stop
    })
}

fn lookup_failed<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    action: &str,
    err: StoreError,
) -> Result<Round, WizardError> {
    warn!(action, error = %err, "lookup failed");
    console.say(format!("❌ Error {action}: {err}"))?;
    Ok(Round::Again)
}

async fn resolve_by_ids<C>(
    catalog: &C,
    form_id: &str,
    inputs: &[String],
) -> Result<Resolution, StoreError>
where
    C: FormCatalog + ?Sized,
{
    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();
    for input in inputs {
        match catalog.field_by_id(&canonical_id(input)).await? {
            Some(field) => {
                let resolved = ResolvedField::from_field(&field, input);
                classify(catalog, form_id, resolved, &mut seen, &mut resolution).await?;
            }
            None => resolution.unresolved.push((input.clone(), Vec::new())),
        }
    }
    Ok(resolution)
}

async fn resolve_by_names<C>(
    catalog: &C,
    form_id: &str,
    fields: &[FormField],
    inputs: &[String],
) -> Result<Resolution, StoreError>
where
    C: FormCatalog + ?Sized,
{
    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();
    for input in inputs {
        match resolve_by_name(fields, input) {
            Some(resolved) => {
                classify(catalog, form_id, resolved, &mut seen, &mut resolution).await?;
            }
            None => {
                let suggestions = suggest_field_names(fields, input, MAX_SUGGESTIONS);
                resolution.unresolved.push((input.clone(), suggestions));
            }
        }
    }
    Ok(resolution)
}

/// Sorts a resolved field into repeated, already mapped or insertable.
async fn classify<C>(
    catalog: &C,
    form_id: &str,
    resolved: ResolvedField,
    seen: &mut HashSet<String>,
    resolution: &mut Resolution,
) -> Result<(), StoreError>
where
    C: FormCatalog + ?Sized,
{
    if !seen.insert(resolved.id.clone()) {
        resolution.repeated.push(resolved.input_name);
    } else if catalog.mapping_exists(form_id, &resolved.id).await? {
        resolution.already_mapped.push(resolved.input_name);
    } else {
        resolution.resolved.push(resolved);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::testing::{scripted, transcript};

    #[derive(Default)]
    struct FakeCatalog {
        forms: Vec<String>,
        fields: Vec<FormField>,
        existing: Vec<(String, String)>,
        fail_insert: bool,
        failing_lookups: Mutex<usize>,
        inserted: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeCatalog {
        fn standard() -> Self {
            Self {
                forms: vec!["F1".into()],
                fields: vec![
                    FormField {
                        id: "10".into(),
                        field_name: "First Name".into(),
                    },
                    FormField {
                        id: "11".into(),
                        field_name: "Email Address".into(),
                    },
                    FormField {
                        id: "12".into(),
                        field_name: "Date of Birth".into(),
                    },
                ],
                ..Self::default()
            }
        }

        fn inserted(&self) -> Vec<(String, Vec<String>)> {
            self.inserted.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl FormCatalog for FakeCatalog {
        async fn form_exists(&self, form_id: &str) -> Result<bool, StoreError> {
            let mut failing = self.failing_lookups.lock().expect("lock");
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::Query(sqlx::Error::PoolTimedOut));
            }
            Ok(self.forms.iter().any(|f| f == form_id))
        }

        async fn field_by_id(&self, field_id: &str) -> Result<Option<FormField>, StoreError> {
            Ok(self.fields.iter().find(|f| f.id == field_id).cloned())
        }

        async fn all_fields(&self) -> Result<Vec<FormField>, StoreError> {
            Ok(self.fields.clone())
        }

        async fn mapping_exists(&self, form_id: &str, field_id: &str) -> Result<bool, StoreError> {
            Ok(self
                .existing
                .iter()
                .any(|(f, id)| f == form_id && id == field_id))
        }

        async fn insert_mappings(
            &self,
            form_id: &str,
            fields: &[FormField],
        ) -> Result<u64, StoreError> {
            if self.fail_insert {
                return Err(StoreError::InsertMismatch {
                    expected: 1,
                    actual: 0,
                });
            }
            self.inserted.lock().expect("lock").push((
                form_id.to_string(),
                fields.iter().map(|f| f.id.clone()).collect(),
            ));
            Ok(fields.len() as u64)
        }
    }

    #[tokio::test]
    async fn maps_fields_by_id_in_input_order() {
        let catalog = FakeCatalog::standard();
        let mut console = scripted(&["F1", "2", "1", "12", "10", "", "y", "n"]);

        let report = run_form_mapping(&catalog, &mut console).await.expect("run");

        assert_eq!(
            report,
            MappingReport {
                forms_mapped: 1,
                fields_mapped: 2
            }
        );
        assert_eq!(
            catalog.inserted(),
            vec![("F1".to_string(), vec!["12".to_string(), "10".to_string()])]
        );
        let out = transcript(console);
        assert!(out.contains("✔ Form validated successfully!"));
        assert!(out.contains("Resolved Fields Preview"));
        assert!(out.contains("📋 order_index will be assigned: 1 to 2"));
        assert!(out.contains("✔ order_index assigned automatically (1 to 2)"));
    }

    #[tokio::test]
    async fn unresolved_names_restart_the_round_with_suggestions() {
        let catalog = FakeCatalog::standard();
        let mut console = scripted(&[
            "F1", "2", "2", "first name", "Emial Address", "",
            "F1", "2", "2", "FIRST-NAME", "email_address", "", "y", "n",
        ]);

        let report = run_form_mapping(&catalog, &mut console).await.expect("run");

        assert_eq!(report.fields_mapped, 2);
        assert_eq!(
            catalog.inserted(),
            vec![("F1".to_string(), vec!["10".to_string(), "11".to_string()])]
        );
        let out = transcript(console);
        assert!(out.contains("could not be resolved"));
        assert!(out.contains("   - Emial Address (did you mean: Email Address?)"));
        assert!(out.contains("Cannot proceed with partial data"));
    }

    #[tokio::test]
    async fn existing_mappings_block_the_batch() {
        let catalog = FakeCatalog {
            existing: vec![("F1".into(), "10".into())],
            ..FakeCatalog::standard()
        };
        let mut console = scripted(&["F1", "2", "1", "10", "11", ""]);

        let report = run_form_mapping(&catalog, &mut console).await.expect("run");

        assert_eq!(report, MappingReport::default());
        assert!(catalog.inserted().is_empty());
        let out = transcript(console);
        assert!(out.contains("already have mappings for this form"));
        assert!(out.contains("   - 10"));
    }

    #[tokio::test]
    async fn same_field_twice_in_one_batch_is_rejected() {
        let catalog = FakeCatalog::standard();
        let mut console = scripted(&["F1", "2", "2", "First Name", "first_name", ""]);

        run_form_mapping(&catalog, &mut console).await.expect("run");

        assert!(catalog.inserted().is_empty());
        let out = transcript(console);
        assert!(out.contains("appear more than once in this batch"));
        assert!(out.contains("   - first_name"));
    }

    #[tokio::test]
    async fn invalid_answers_restart_without_lookups() {
        let catalog = FakeCatalog::standard();
        let mut console = scripted(&[
            "",
            "NOPE",
            "F1", "zero",
            "F1", "0",
            "F1", "1", "3",
            "F1", "2", "1", "10", "",
        ]);

        let report = run_form_mapping(&catalog, &mut console).await.expect("run");

        assert_eq!(report, MappingReport::default());
        let out = transcript(console);
        assert!(out.contains("❌ Form ID cannot be empty."));
        assert!(out.contains("❌ Form with ID 'NOPE' does not exist."));
        assert!(out.contains("❌ Please enter a valid number."));
        assert!(out.contains("❌ Number of fields must be greater than 0."));
        assert!(out.contains("❌ Invalid choice. Please enter 1 or 2."));
        assert!(out.contains("❌ Expected 2 fields, but received 1."));
    }

    #[tokio::test]
    async fn declining_and_not_retrying_stops_without_insert() {
        let catalog = FakeCatalog::standard();
        let mut console = scripted(&["F1", "1", "1", "11", "", "n", "n", "F1"]);

        run_form_mapping(&catalog, &mut console).await.expect("run");

        assert!(catalog.inserted().is_empty());
        let out = transcript(console);
        assert!(out.contains("❌ Mapping cancelled by user."));
        assert_eq!(out.matches("Enter Form ID: ").count(), 1);
    }

    #[tokio::test]
    async fn failed_insert_reports_rollback() {
        let catalog = FakeCatalog {
            fail_insert: true,
            ..FakeCatalog::standard()
        };
        let mut console = scripted(&["F1", "1", "1", "11", "", "Y", "n"]);

        let report = run_form_mapping(&catalog, &mut console).await.expect("run");

        assert_eq!(report.forms_mapped, 0);
        let out = transcript(console);
        assert!(out.contains("❌ Error inserting mappings"));
        assert!(out.contains("❌ Transaction rolled back. No data was inserted."));
    }

    #[tokio::test]
    async fn uppercase_uuids_resolve_to_stored_ids() {
        let form = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let field = "9b2f0c1e-3d4a-4e5f-8a6b-7c8d9e0f1a2b";
        let catalog = FakeCatalog {
            forms: vec![form.into()],
            fields: vec![FormField {
                id: field.into(),
                field_name: "Phone".into(),
            }],
            ..FakeCatalog::default()
        };
        let mut console = scripted(&[
            "67E55044-10B1-426F-9247-BB680E5FE0C8",
            "1",
            "1",
            "9B2F0C1E-3D4A-4E5F-8A6B-7C8D9E0F1A2B",
            "",
            "y",
            "n",
        ]);

        let report = run_form_mapping(&catalog, &mut console).await.expect("run");

        assert_eq!(report.fields_mapped, 1);
        assert_eq!(
            catalog.inserted(),
            vec![(form.to_string(), vec![field.to_string()])]
        );
        assert!(transcript(console).contains(&format!("📋 Form ID: {form}")));
    }

    #[tokio::test]
    async fn lookup_error_ends_only_the_current_round() {
        let catalog = FakeCatalog {
            failing_lookups: Mutex::new(1),
            ..FakeCatalog::standard()
        };
        let mut console = scripted(&["F1", "F1", "1", "1", "10", "", "y", "n"]);

        let report = run_form_mapping(&catalog, &mut console).await.expect("run");

        assert_eq!(report.fields_mapped, 1);
        let out = transcript(console);
        assert!(out.contains("❌ Error validating form:"));
        assert_eq!(out.matches("Enter Form ID: ").count(), 2);
    }

    #[tokio::test]
    async fn empty_field_catalog_restarts_name_mode() {
        let catalog = FakeCatalog {
            forms: vec!["F1".into()],
            ..FakeCatalog::default()
        };
        let mut console = scripted(&["F1", "1", "2", "Phone", ""]);

        let report = run_form_mapping(&catalog, &mut console).await.expect("run");

        assert_eq!(report, MappingReport::default());
        let out = transcript(console);
        assert!(out.contains("❌ Could not fetch fields from database."));
        assert!(!out.contains("Resolved Fields Preview"));
    }

    #[tokio::test]
    async fn unknown_ids_are_listed_without_suggestions() {
        let catalog = FakeCatalog::standard();
        let mut console = scripted(&["F1", "2", "1", "10", "99", ""]);

        run_form_mapping(&catalog, &mut console).await.expect("run");

        assert!(catalog.inserted().is_empty());
        let out = transcript(console);
        assert!(out.contains("could not be resolved"));
        assert!(out.contains("   - 99\n"));
        assert!(!out.contains("did you mean"));
    }
}
