//! Static remediation tables.
//!
//! Loaded once at first use, read-only afterwards. Two tiers share one
//! table: category rules map an exception kind into the closed category set,
//! fix hints keep the category `Unclassified` but still carry an explanation
//! and a suggested action.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;

use super::ErrorCategory;

/// One remediation rule. Templates use `{placeholder}` slots filled from
/// values extracted out of the error message.
pub(crate) struct Rule {
    pub category: ErrorCategory,
    pub explanation: &'static str,
    pub action: Option<&'static str>,
}

const fn rule(
    category: ErrorCategory,
    explanation: &'static str,
    action: Option<&'static str>,
) -> Rule {
    Rule {
        category,
        explanation,
        action,
    }
}

static RULES: LazyLock<FxHashMap<&'static str, Rule>> = LazyLock::new(|| {
    use ErrorCategory::*;

    let mut m = FxHashMap::default();

    // Category tier: kinds that land in the closed category set.
    m.insert(
        "ModuleNotFoundError",
        rule(
            MissingDependency,
            "Module '{module}' is not installed.",
            Some("pip install {package}"),
        ),
    );
    m.insert(
        "ImportError",
        rule(
            MissingDependency,
            "Cannot import '{name}'; the providing package may be missing or broken.",
            Some("pip install {package}"),
        ),
    );
    m.insert(
        "NameError",
        rule(
            UndefinedName,
            "Name '{name}' is not defined.",
            Some("Define '{name}' before using it, or check for typos."),
        ),
    );
    m.insert(
        "UnboundLocalError",
        rule(
            UndefinedName,
            "Local name '{name}' is referenced before assignment.",
            Some("Assign '{name}' before its first use."),
        ),
    );
    m.insert(
        "FileNotFoundError",
        rule(
            MissingPath,
            "File or directory not found: '{path}'.",
            Some("Verify the path exists; check the working directory first."),
        ),
    );
    m.insert(
        "PermissionError",
        rule(
            MissingPath,
            "Permission denied: '{path}'.",
            Some("Check file permissions on the target path."),
        ),
    );
    m.insert(
        "OSError",
        rule(
            MissingPath,
            "Operating system error during file access.",
            Some("Check the target path and its permissions."),
        ),
    );
    m.insert(
        "TypeError",
        rule(
            TypeMismatch,
            "Type error in operation.",
            Some("Check argument types; inspect values with type()."),
        ),
    );
    m.insert(
        "AttributeError",
        rule(
            TypeMismatch,
            "'{type}' object has no attribute '{attribute}'.",
            Some("Check the object type and its available attributes with dir()."),
        ),
    );
    m.insert("KeyboardInterrupt", rule(Interrupted, "Execution was interrupted.", None));
    m.insert(
        "TimeoutError",
        rule(
            Timeout,
            "Operation timed out.",
            Some("Increase the timeout or check whether the operation is stuck."),
        ),
    );

    // Fix-hint tier: kinds outside the category taxonomy still get a hint.
    m.insert(
        "KeyError",
        rule(
            Unclassified,
            "Key {key} not found.",
            Some("Use .get(key, default) for safe access, or check the available keys."),
        ),
    );
    m.insert(
        "IndexError",
        rule(
            Unclassified,
            "Index out of range.",
            Some("Check the sequence length with len() before indexing."),
        ),
    );
    m.insert(
        "ValueError",
        rule(
            Unclassified,
            "Invalid value provided.",
            Some("Check the expected value format or range."),
        ),
    );
    m.insert(
        "ZeroDivisionError",
        rule(
            Unclassified,
            "Division by zero.",
            Some("Guard the divisor with a zero check before dividing."),
        ),
    );
    m.insert(
        "SyntaxError",
        rule(
            Unclassified,
            "Syntax error in code.",
            Some("Check for missing colons, parentheses, or quotes."),
        ),
    );
    m.insert(
        "IndentationError",
        rule(
            Unclassified,
            "Indentation error.",
            Some("Use consistent indentation throughout the block."),
        ),
    );
    m.insert(
        "RecursionError",
        rule(
            Unclassified,
            "Maximum recursion depth exceeded.",
            Some("Add a base case or convert the recursion to iteration."),
        ),
    );
    m.insert(
        "MemoryError",
        rule(
            Unclassified,
            "Out of memory.",
            Some("Reduce the data size or process it in chunks."),
        ),
    );
    m.insert(
        "ConnectionError",
        rule(
            Unclassified,
            "Connection failed.",
            Some("Check network connectivity and the target host."),
        ),
    );

    m
});

/// Known subclass -> base relationships among provider exception kinds.
///
/// Lets a base rule catch subclasses that have no exact entry; an exact
/// match always wins over the base fallback.
static BASE_KINDS: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("ModuleNotFoundError", "ImportError"),
        ("FileNotFoundError", "OSError"),
        ("PermissionError", "OSError"),
        ("NotADirectoryError", "OSError"),
        ("IsADirectoryError", "OSError"),
        ("TimeoutError", "OSError"),
        ("UnboundLocalError", "NameError"),
        ("IndentationError", "SyntaxError"),
        ("TabError", "IndentationError"),
        ("KeyError", "LookupError"),
        ("IndexError", "LookupError"),
        ("BrokenPipeError", "ConnectionError"),
        ("ConnectionResetError", "ConnectionError"),
        ("ConnectionRefusedError", "ConnectionError"),
        ("ConnectionAbortedError", "ConnectionError"),
    ]
    .into_iter()
    .collect()
});

/// Look up the rule for an exception kind, walking the base-kind chain on a
/// miss. Exact matches win over base-kind fallbacks.
pub(crate) fn lookup_rule(kind: &str) -> Option<&'static Rule> {
    let mut current = kind;
    // Chain depth is tiny; the bound guards against a future cyclic entry.
    for _ in 0..4 {
        if let Some(rule) = RULES.get(current) {
            return Some(rule);
        }
        match BASE_KINDS.get(current) {
            Some(base) => current = *base,
            None => return None,
        }
    }
    None
}

/// Import-name -> installable-package aliases, for imports whose module name
/// differs from the package that provides it.
static PACKAGE_ALIASES: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("cv2", "opencv-python"),
        ("sklearn", "scikit-learn"),
        ("skimage", "scikit-image"),
        ("PIL", "pillow"),
        ("yaml", "pyyaml"),
        ("bs4", "beautifulsoup4"),
        ("dateutil", "python-dateutil"),
        ("dotenv", "python-dotenv"),
        ("jwt", "pyjwt"),
        ("magic", "python-magic"),
        ("serial", "pyserial"),
        ("usb", "pyusb"),
        ("wx", "wxpython"),
        ("gi", "pygobject"),
        ("cairo", "pycairo"),
        ("Crypto", "pycryptodome"),
        ("OpenSSL", "pyopenssl"),
        ("MySQLdb", "mysqlclient"),
        ("psycopg2", "psycopg2-binary"),
        ("tf", "tensorflow"),
        ("google.cloud", "google-cloud-core"),
        ("azure", "azure-core"),
    ]
    .into_iter()
    .collect()
});

/// Resolve the installable package name for an import token.
///
/// Tries the full dotted name first, then the base module; unaliased names
/// pass through unchanged.
pub fn installable_package(import_name: &str) -> &str {
    if let Some(package) = PACKAGE_ALIASES.get(import_name).copied() {
        return package;
    }
    let base = import_name.split('.').next().unwrap_or(import_name);
    PACKAGE_ALIASES.get(base).copied().unwrap_or(import_name)
}
