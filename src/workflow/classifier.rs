//! 平台识别
//!
//! 纯函数：只看导航后的 URL 和 DOM 标记，不发网络请求。
//! 相同的 URL + DOM 一定得到相同的结果。

use std::sync::LazyLock;

use phf::phf_map;
use regex::Regex;
use reqwest::Url;

use crate::models::Platform;

/// 已知招聘系统的注册域名
static KNOWN_HOSTS: phf::Map<&'static str, Platform> = phf_map! {
    "greenhouse.io" => Platform::Greenhouse,
    "lever.co" => Platform::Lever,
    "myworkdayjobs.com" => Platform::Workday,
    "myworkdaysite.com" => Platform::Workday,
    "linkedin.com" => Platform::LinkedIn,
};

/// DOM 中的厂商标记，按优先级排列
static DOM_MARKERS: LazyLock<Vec<(Regex, Platform)>> = LazyLock::new(|| {
    [
        (r"(?i)boards\.greenhouse\.io|grnhse_|greenhouse", Platform::Greenhouse),
        (r"(?i)lever-frame|jobs\.lever\.co|lever-application", Platform::Lever),
        (r#"(?i)data-automation-id="(?:jobPostingHeader|applyManually|adventureButton)""#, Platform::Workday),
    ]
    .into_iter()
    .map(|(pattern, platform)| (Regex::new(pattern).expect("valid regex"), platform))
    .collect()
});

/// 识别申请页面所属的平台
pub fn classify(url: &str, html: &str) -> Platform {
    if let Some(platform) = classify_url(url) {
        return platform;
    }

    DOM_MARKERS
        .iter()
        .find(|(marker, _)| marker.is_match(html))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Generic)
}

fn classify_url(url: &str) -> Option<Platform> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    // 逐级去掉子域名查找：boards.eu.greenhouse.io -> eu.greenhouse.io -> greenhouse.io
    let mut candidate = host.as_str();
    loop {
        if let Some(platform) = KNOWN_HOSTS.get(candidate) {
            return match platform {
                // 只有职位页才是申请入口，其余 LinkedIn 页面按通用表单处理
                Platform::LinkedIn if !parsed.path().starts_with("/jobs") => None,
                other => Some(*other),
            };
        }
        match candidate.split_once('.') {
            Some((_, rest)) if rest.contains('.') => candidate = rest,
            _ => return None,
        }
    }
}
