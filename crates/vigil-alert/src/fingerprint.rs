use sha2::{Digest, Sha256};
use vigil_common::types::Labels;

/// Computes the identity of the alert a rule produces for a label set.
///
/// Only `rule_id` and `labels` are hashed. Observed values are deliberately
/// excluded, so a fluctuating metric keeps mapping to one alert. Label order
/// is irrelevant because [`Labels`] iterates sorted.
///
/// # Examples
///
/// ```
/// use vigil_alert::fingerprint::fingerprint;
/// use vigil_common::types::Labels;
///
/// let mut labels = Labels::new();
/// labels.insert("host".into(), "web-1".into());
/// let fp = fingerprint("cpu-high", &labels);
/// assert_eq!(fp.len(), 16);
/// assert_eq!(fp, fingerprint("cpu-high", &labels));
/// assert_ne!(fp, fingerprint("cpu-low", &labels));
/// ```
pub fn fingerprint(rule_id: &str, labels: &Labels) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    for (k, v) in labels {
        // 0xff never occurs in UTF-8, so field boundaries cannot collide.
        hasher.update([0xff]);
        hasher.update(k.as_bytes());
        hasher.update([0xfe]);
        hasher.update(v.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
