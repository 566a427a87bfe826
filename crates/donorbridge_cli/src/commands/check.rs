use console::style;
use donorbridge::sync::CodeCheck;
use serde::Serialize;
use tabled::Tabled;

use super::shared::{Access, Context, OutputFormat, print_json, print_rows};
use crate::CheckAction;

#[derive(Debug, Serialize, Tabled)]
struct CodeRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Code")]
    value: String,
    #[tabled(rename = "Valid")]
    valid: &'static str,
}

impl From<&CodeCheck> for CodeRow {
    fn from(check: &CodeCheck) -> Self {
        Self {
            field: check.field.field_name(),
            value: check.value.clone(),
            valid: if check.valid { "yes" } else { "NO" },
        }
    }
}

pub(crate) async fn handle_check(
    ctx: &Context,
    action: CheckAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ctx.open_engine(Access::Destination).await?;

    match action {
        CheckAction::Connection { output } => {
            let status = engine.test_connection().await?;
            match output {
                OutputFormat::Table => {
                    if status.ok {
                        println!("{} {}", style("✓").green(), status.message);
                    } else {
                        println!("{} {}", style("✗").red(), status.message);
                    }
                }
                OutputFormat::Json => print_json(&status)?,
            }
            if !status.ok {
                return Err("DonorPerfect connection failed".into());
            }
        }
        CheckAction::Codes { output } => {
            let checks = engine.validate_codes().await?;
            let invalid = checks.iter().filter(|c| !c.valid).count();
            match output {
                OutputFormat::Table => {
                    print_rows(checks.iter().map(CodeRow::from).collect(), output)?;
                }
                OutputFormat::Json => print_json(&checks)?,
            }
            if invalid > 0 {
                return Err(format!("{invalid} configured code(s) are not valid in DonorPerfect").into());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use donorbridge::destination::CodeField;

    use super::*;

    #[test]
    fn code_row_uses_destination_field_names() {
        let row = CodeRow::from(&CodeCheck {
            field: CodeField::GlCode,
            value: "UN".to_string(),
            valid: true,
        });
        assert_eq!(row.field, "GL_CODE");
        assert_eq!(row.valid, "yes");

        let row = CodeRow::from(&CodeCheck {
            field: CodeField::GiftType,
            value: "CC".to_string(),
            valid: false,
        });
        assert_eq!(row.field, "GIFT_TYPE");
        assert_eq!(row.valid, "NO");
    }
}
