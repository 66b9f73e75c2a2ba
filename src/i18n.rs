// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持繁体中文（默认）和英文
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

/// 排程警告固定使用的语言（关键字分类器依赖该语言的文本）
pub const WARNING_LOCALE: &str = "zh-TW";

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"zh-TW" 或 "en"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use factory_mes::i18n::t;
/// let msg = t("common.success");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use factory_mes::i18n::t_with_args;
/// let msg = t_with_args("import.file_not_found", &[("path", "/tmp/holidays.csv")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    fill_args(rust_i18n::t!(key).to_string(), args)
}

/// 以指定语言翻译消息（带参数），不改变全局语言
pub fn t_in_locale(locale: &str, key: &str, args: &[(&str, &str)]) -> String {
    fill_args(rust_i18n::t!(key, locale = locale).to_string(), args)
}

fn fill_args(template: String, args: &[(&str, &str)]) -> String {
    let mut result = template;
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // rust-i18n 的 locale 为全局状态，且 Rust 测试默认并行执行；
    // 为避免测试互相干扰，这里对 i18n 相关测试串行化。
    static LOCALE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_set_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        assert_eq!(current_locale(), "en");
        set_locale("zh-TW");
        assert_eq!(current_locale(), "zh-TW");
    }

    #[test]
    fn test_translate_with_args() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        let msg = t_with_args("import.file_not_found", &[("path", "/tmp/h.csv")]);
        assert!(msg.contains("/tmp/h.csv"));
        assert!(msg.contains("File not found"));
        set_locale("zh-TW");
    }

    #[test]
    fn test_warning_locale_is_independent_of_current_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        let msg = t_in_locale(
            WARNING_LOCALE,
            "schedule.warning.route_missing",
            &[("product", "PFP-X")],
        );
        assert!(msg.starts_with("工序未設定"));
        assert!(msg.contains("PFP-X"));
        set_locale("zh-TW");
    }
}
