use regex::Regex;

pub const UNKNOWN: &str = "Unknown";

pub const PHYSICAL_SIZE_LABEL: &str = "Physical size:";
pub const OVERRIDE_SIZE_LABEL: &str = "Override size:";
pub const PHYSICAL_DENSITY_LABEL: &str = "Physical density:";
pub const OVERRIDE_DENSITY_LABEL: &str = "Override density:";

/// Text after the first colon of the first line containing `label`.
pub fn value_after_label(output: &str, label: &str) -> Option<String> {
    let line = output.lines().find(|line| line.contains(label))?;
    let (_, value) = line.split_once(':')?;
    Some(value.trim().to_string())
}

pub fn label_or_unknown(output: &str, label: &str) -> String {
    value_after_label(output, label).unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn parse_dimensions(value: &str) -> Option<(i32, i32)> {
    let re = Regex::new(r"(\d+)\s*x\s*(\d+)").ok()?;
    let caps = re.captures(value)?;
    let width = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let height = caps.get(2)?.as_str().parse::<i32>().ok()?;
    if width <= 0 || height <= 0 {
        return None;
    }
    Some((width, height))
}

/// Effective size from `wm size`; an override wins over the physical panel.
pub fn parse_wm_size(output: &str) -> Option<(i32, i32)> {
    [OVERRIDE_SIZE_LABEL, PHYSICAL_SIZE_LABEL]
        .iter()
        .find_map(|label| value_after_label(output, label).and_then(|value| parse_dimensions(&value)))
}

pub fn parse_wm_density(output: &str) -> Option<i32> {
    [OVERRIDE_DENSITY_LABEL, PHYSICAL_DENSITY_LABEL]
        .iter()
        .find_map(|label| {
            value_after_label(output, label)
                .and_then(|value| value.parse::<i32>().ok())
                .filter(|density| *density > 0)
        })
}

/// Package names from `pm list packages`, with or without `-f` paths.
pub fn parse_pm_list_packages(output: &str) -> Vec<String> {
    let mut packages = Vec::new();
    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let payload = line.trim_start_matches("package:");
        let name = match payload.rsplit_once('=') {
            Some((_, pkg)) => pkg.trim(),
            None => payload.trim(),
        };
        if !name.is_empty() {
            packages.push(name.to_string());
        }
    }
    packages
}
