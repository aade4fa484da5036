//! Keyword families used by feature extraction and rule-based routing.
//!
//! Matching is case-insensitive substring matching against lowercased task
//! text, so entries are stems ("рефактор" matches "рефакторинг"). The three
//! families are disjoint: no stem appears in more than one list.

/// Script-like tasks: reports, listings, lint/test runs.
pub const PROGRAM_KEYWORDS: &[&str] = &[
    "отчёт",
    "отчет",
    "статистик",
    "покажи",
    "список",
    "показать",
    "валидац",
    "провер",
    "lint",
    "format",
    "pytest",
    "тест запуст",
    "npm test",
    "benchmark",
    "синхрониз",
    "coverage",
    "расход",
    "report",
    "statistic",
    "show me",
    "list all",
    "run tests",
    "spending",
];

/// High-complexity tasks: architecture, security, large rewrites.
pub const COMPLEX_KEYWORDS: &[&str] = &[
    "архитектур",
    "рефактор",
    "миграц",
    "безопасн",
    "security",
    "производительн",
    "оптимизац",
    "переписать",
    "distributed",
    "микросервис",
    "cqrs",
    "event-driven",
    "шифрован",
    "аудит",
    "architect",
    "refactor",
    "migrat",
    "performance",
    "optimiz",
    "rewrite",
    "microservice",
    "encrypt",
    "audit",
];

/// Medium-complexity tasks: a feature, an endpoint, an integration.
pub const MEDIUM_KEYWORDS: &[&str] = &[
    "api endpoint",
    "endpoint",
    "модуль",
    "компонент",
    "фич",
    "интеграц",
    "middleware",
    "crud",
    "webhook",
    "jwt",
    "oauth",
    "pydantic",
    "кеширован",
    "кэширован",
    "redis",
    "e2e тест",
    "caching",
    "module",
    "component",
    "feature",
    "integrat",
];

/// Code-syntax markers.
pub const CODE_MARKERS: &[&str] = &[
    "def ", "class ", "function ", "import ", "async ", "await ", "const ", "let ", "var ",
    "=>", "{}", "[]", "return ",
];

/// Number of entries in `keywords` that occur in `text_lower`
pub fn count_hits(text_lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text_lower.contains(*kw)).count()
}
