//! Safety gate for model-generated SQL.
//!
//! Classifies a statement before it reaches the database and refuses
//! anything that is not a single read-only query. Comments, string
//! literals, and quoted identifiers are masked first so that text such as
//! `WHERE [Description] LIKE '%DROP TABLE%'` is not mistaken for DDL.

use std::sync::LazyLock;

use regex::Regex;

/// Coarse classification of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlClass {
    /// `SELECT` / `WITH ... SELECT` without side effects.
    Read,
    /// Data modification (`INSERT`, `UPDATE`, `DELETE`, `MERGE`, `SELECT ... INTO`).
    Write,
    /// Schema changes (`CREATE`, `DROP`, `ALTER`, `TRUNCATE`).
    Ddl,
    /// Permissions, procedures, and engine commands.
    Admin,
    /// Empty, multi-statement, or unparseable input.
    Unknown,
}

/// Decision made by the gate about one generated statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Statement may be executed.
    Allow,
    /// Statement must not reach the database.
    Deny { class: SqlClass, reason: String },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

const WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "INTO"];
const DDL_KEYWORDS: &[&str] = &["CREATE", "DROP", "ALTER", "TRUNCATE", "RENAME"];
const ADMIN_KEYWORDS: &[&str] = &[
    "GRANT", "REVOKE", "EXEC", "EXECUTE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX",
    "ANALYZE", "BACKUP", "RESTORE", "SHUTDOWN", "DBCC", "KILL", "USE", "DECLARE", "SET",
];

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("Invalid word regex"));
static LIMIT_N: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+)").expect("Invalid LIMIT regex"));
static TOP_N: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bTOP\s*\(?\s*(\d+)").expect("Invalid TOP regex"));
static FETCH_N: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bFETCH\s+(?:FIRST|NEXT)\s+(\d+)").expect("Invalid FETCH regex")
});

/// Read-only gate inserted between SQL generation and execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlGate;

impl SqlGate {
    pub fn new() -> Self {
        Self
    }

    /// Classify a statement.
    pub fn classify(&self, sql: &str) -> SqlClass {
        let masked = match mask_sql(sql) {
            Some(m) => m,
            None => return SqlClass::Unknown,
        };

        let statements: Vec<&str> = masked
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if statements.len() != 1 {
            return SqlClass::Unknown;
        }

        let words: Vec<String> = WORD
            .find_iter(statements[0])
            .map(|m| m.as_str().to_ascii_uppercase())
            .collect();
        let Some(first) = words.first() else {
            return SqlClass::Unknown;
        };

        let contains_any = |set: &[&str]| words.iter().any(|w| set.contains(&w.as_str()));

        match first.as_str() {
            "SELECT" | "WITH" => {
                if contains_any(DDL_KEYWORDS) {
                    SqlClass::Ddl
                } else if contains_any(WRITE_KEYWORDS) {
                    SqlClass::Write
                } else if words.iter().any(|w| w == "SELECT") {
                    SqlClass::Read
                } else {
                    SqlClass::Unknown
                }
            }
            "INSERT" | "UPDATE" | "DELETE" | "MERGE" | "UPSERT" | "REPLACE" => SqlClass::Write,
            w if DDL_KEYWORDS.contains(&w) => SqlClass::Ddl,
            w if ADMIN_KEYWORDS.contains(&w) => SqlClass::Admin,
            _ => SqlClass::Unknown,
        }
    }

    /// Check a statement and return a gate decision.
    pub fn check(&self, sql: &str) -> GateDecision {
        let class = self.classify(sql);
        let reason = match class {
            SqlClass::Read => return GateDecision::Allow,
            SqlClass::Write => "statement modifies data",
            SqlClass::Ddl => "statement changes the schema",
            SqlClass::Admin => "statement issues an administrative command",
            SqlClass::Unknown => "statement is not a single read-only query",
        };
        GateDecision::Deny {
            class,
            reason: reason.to_string(),
        }
    }
}

/// Row limit requested by a statement (`LIMIT n`, `TOP n`, or `FETCH FIRST n`).
///
/// Returns the smallest limit found, or `None` when the statement does not
/// limit its rows.
pub fn row_limit(sql: &str) -> Option<u64> {
    let masked = mask_sql(sql)?;
    [&*LIMIT_N, &*TOP_N, &*FETCH_N]
        .iter()
        .flat_map(|re| re.captures_iter(&masked).collect::<Vec<_>>())
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<u64>().ok()))
        .min()
}

/// Replace every occurrence of the given secrets with `[REDACTED]`.
///
/// Secrets shorter than four characters are ignored to avoid mangling
/// ordinary text.
pub fn redact_secrets(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|s| s.len() >= 4)
        .fold(text.to_string(), |acc, secret| acc.replace(secret, "[REDACTED]"))
}

/// Mask comments, string literals, and quoted identifiers.
///
/// Comments become a single space, literals become `''`, identifiers become
/// `ident`. Returns `None` for an unterminated literal, identifier, or block
/// comment.
fn mask_sql(sql: &str) -> Option<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                out.push(' ');
            }
            '/' if next == Some('*') => {
                i += 2;
                loop {
                    if i + 1 >= chars.len() {
                        return None;
                    }
                    if chars[i] == '*' && chars[i + 1] == '/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                out.push(' ');
            }
            '\'' => {
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return None,
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => i += 2,
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                out.push_str("''");
            }
            '[' | '"' | '`' => {
                let close = match c {
                    '[' => ']',
                    other => other,
                };
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return None,
                        Some(&ch) if ch == close && chars.get(i + 1) == Some(&close) => i += 2,
                        Some(&ch) if ch == close => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                out.push_str(" ident ");
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SqlGate {
        SqlGate::new()
    }

    // ---- Read statements ----

    #[test]
    fn test_simple_select_allowed() {
        assert_eq!(gate().classify("SELECT COUNT(*) FROM [Logs]"), SqlClass::Read);
        assert!(gate().check("SELECT COUNT(*) FROM [Logs];").is_allowed());
    }

    #[test]
    fn test_cte_select_allowed() {
        let sql = "WITH recent AS (SELECT [Type] FROM [Logs] ORDER BY [TimeStamp] DESC LIMIT 10) \
                   SELECT [Type], COUNT(*) FROM recent GROUP BY [Type]";
        assert_eq!(gate().classify(sql), SqlClass::Read);
    }

    #[test]
    fn test_keywords_inside_literals_are_ignored() {
        let sql = "SELECT [Description] FROM [Logs] WHERE [Description] LIKE '%DROP TABLE%' LIMIT 10";
        assert!(gate().check(sql).is_allowed());
    }

    #[test]
    fn test_keywords_inside_identifiers_are_ignored() {
        let sql = "SELECT [Update], \"Delete\" FROM [Logs]";
        assert!(gate().check(sql).is_allowed());
    }

    #[test]
    fn test_keywords_inside_comments_are_ignored() {
        let sql = "-- DELETE everything\nSELECT 1 /* DROP */";
        assert!(gate().check(sql).is_allowed());
    }

    #[test]
    fn test_replace_function_in_select_allowed() {
        let sql = "SELECT REPLACE([Tags], ',', ' ') FROM [Logs] LIMIT 5";
        assert!(gate().check(sql).is_allowed());
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let sql = "SELECT 1 FROM [Logs] WHERE [Description] = 'it''s; DROP TABLE x'";
        assert!(gate().check(sql).is_allowed());
    }

    // ---- Denied statements ----

    #[test]
    fn test_mutations_denied() {
        for sql in [
            "INSERT INTO [Logs] ([GUID]) VALUES ('x')",
            "UPDATE [Logs] SET [Type] = 'Error'",
            "delete from Logs",
            "MERGE INTO Logs USING x ON 1=1",
            "REPLACE INTO Logs VALUES (1)",
        ] {
            match gate().check(sql) {
                GateDecision::Deny { class, .. } => assert_eq!(class, SqlClass::Write, "{}", sql),
                GateDecision::Allow => panic!("allowed: {}", sql),
            }
        }
    }

    #[test]
    fn test_ddl_denied() {
        for sql in ["DROP TABLE [Logs]", "ALTER TABLE Logs ADD x INT", "TRUNCATE TABLE Logs"] {
            assert_eq!(gate().classify(sql), SqlClass::Ddl, "{}", sql);
        }
    }

    #[test]
    fn test_admin_denied() {
        assert_eq!(gate().classify("PRAGMA table_info(Logs)"), SqlClass::Admin);
        assert_eq!(gate().classify("EXEC sp_who"), SqlClass::Admin);
        assert_eq!(gate().classify("ATTACH DATABASE 'x.db' AS x"), SqlClass::Admin);
    }

    #[test]
    fn test_admin_words_as_aliases_allowed() {
        let sql = "SELECT COUNT(*) AS Use, [Type] AS Set FROM [Logs] GROUP BY [Type]";
        assert_eq!(gate().classify(sql), SqlClass::Read);
        assert!(gate().check(sql).is_allowed());

        assert_eq!(gate().classify("USE master"), SqlClass::Admin);
        assert_eq!(gate().classify("SET ROWCOUNT 0"), SqlClass::Admin);
    }

    #[test]
    fn test_select_into_denied() {
        let sql = "SELECT * INTO LogsBackup FROM Logs";
        assert_eq!(gate().classify(sql), SqlClass::Write);
    }

    #[test]
    fn test_cte_wrapping_write_denied() {
        let sql = "WITH x AS (SELECT 1) DELETE FROM Logs";
        assert!(!gate().check(sql).is_allowed());
    }

    #[test]
    fn test_multiple_statements_denied() {
        let sql = "SELECT 1; DROP TABLE Logs";
        assert_eq!(gate().classify(sql), SqlClass::Unknown);
        assert!(!gate().check(sql).is_allowed());
    }

    #[test]
    fn test_empty_and_garbage_denied() {
        assert_eq!(gate().classify(""), SqlClass::Unknown);
        assert_eq!(gate().classify("   ;  "), SqlClass::Unknown);
        assert_eq!(gate().classify("I don't know"), SqlClass::Unknown);
        assert_eq!(gate().classify("SELECT 'unterminated"), SqlClass::Unknown);
        assert_eq!(gate().classify("SELECT 1 /* open"), SqlClass::Unknown);
    }

    #[test]
    fn test_deny_reason_present() {
        match gate().check("DROP TABLE Logs") {
            GateDecision::Deny { reason, .. } => assert!(reason.contains("schema")),
            GateDecision::Allow => panic!("DROP allowed"),
        }
    }

    // ---- Row limits ----

    #[test]
    fn test_row_limit_sqlite() {
        assert_eq!(row_limit("SELECT [GUID] FROM [Logs] ORDER BY [TimeStamp] DESC LIMIT 5"), Some(5));
    }

    #[test]
    fn test_row_limit_mssql() {
        assert_eq!(row_limit("SELECT TOP 10 [GUID] FROM [Logs]"), Some(10));
        assert_eq!(row_limit("SELECT TOP (3) [GUID] FROM [Logs]"), Some(3));
    }

    #[test]
    fn test_row_limit_fetch_first() {
        assert_eq!(
            row_limit("SELECT x FROM Logs ORDER BY x OFFSET 0 ROWS FETCH NEXT 7 ROWS ONLY"),
            Some(7)
        );
    }

    #[test]
    fn test_row_limit_absent() {
        assert_eq!(row_limit("SELECT COUNT(*) FROM [Logs]"), None);
        assert_eq!(row_limit("SELECT 'LIMIT 5' FROM [Logs]"), None);
    }

    #[test]
    fn test_row_limit_smallest_wins() {
        let sql = "SELECT * FROM (SELECT x FROM Logs LIMIT 50) LIMIT 8";
        assert_eq!(row_limit(sql), Some(8));
    }

    // ---- Redaction ----

    #[test]
    fn test_redact_secrets() {
        let text = "request failed: invalid key sk-abc123 for user";
        assert_eq!(
            redact_secrets(text, &["sk-abc123"]),
            "request failed: invalid key [REDACTED] for user"
        );
    }

    #[test]
    fn test_redact_ignores_short_secrets() {
        assert_eq!(redact_secrets("a b c", &["", "a"]), "a b c");
    }
}
