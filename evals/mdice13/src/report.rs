//! 评估结果的格式化输出.

use btcv_berry::consts::{all_targets, organ};
use btcv_berry::eval::dice::DiceReport;
use std::io::{self, Write};

/// 将 `report` 的逐 target 得分写进 `w` 中.
fn describe_into<W: Write>(report: &DiceReport, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn dice_to_display(dice: Option<f64>) -> String {
        match dice {
            Some(d) => format!("{d:.6}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Dice scores:")?;
    for target in all_targets() {
        writeln!(
            w,
            "{S4}{:>2} {:<24} {}",
            target,
            organ::name(target),
            dice_to_display(report.get(target))
        )?;
    }
    match report.mean() {
        Some(m) => write!(w, "mDice:  {m:.6}"),
        None => write!(w, "mDice:  not scorable (no target present in ground truth)"),
    }
}

/// 打印单个样本的 Dice 报告.
pub fn print_report(report: &DiceReport) {
    let mut buf = Vec::with_capacity(512);
    describe_into(report, &mut buf).unwrap();
    println!("{}", std::str::from_utf8(&buf).unwrap());
    utils::sep();
}

#[cfg(test)]
mod tests {
    use super::*;
    use btcv_berry::consts::NUM_CLASSES;

    fn render(report: &DiceReport) -> String {
        let mut buf = Vec::new();
        describe_into(report, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_absent_targets_render_as_slash() {
        let mut scores = [None; NUM_CLASSES];
        scores[6] = Some(0.875);
        let text = render(&DiceReport::from_scores(scores));

        assert!(text.contains("liver"));
        assert!(text.contains("0.875000"));
        assert!(text.contains("/"));
        assert!(text.contains("mDice:  0.875000"));
    }

    #[test]
    fn test_all_absent_renders_not_scorable() {
        let text = render(&DiceReport::from_scores([None; NUM_CLASSES]));
        assert!(text.contains("not scorable"));
    }
}
