//! 循迹决策表
//!
//! `true` 表示该路传感器检测到黑线。按从具体到一般的顺序匹配：
//!
//! | 左 | 中 | 右 | 决策 |
//! |----|----|----|------|
//! | 0 | 1 | 0 | 直行 |
//! | 1 | 1 | 0 | 轻微左修正 |
//! | 0 | 1 | 1 | 轻微右修正 |
//! | 1 | 0 | 0 | 较强左修正 |
//! | 0 | 0 | 1 | 较强右修正 |
//! | 1 | 1 | 1 | 沿用上一次有效方向 |
//! | 0 | 0 | 0 | 不做决策（交给标记检测） |
//! | 1 | 0 | 1 | 停止（丢线） |
//!
//! 修正方向朝向检测到黑线的一侧，使中间传感器回到线上。

use lalabot_hal::{Direction, LineReading};

/// 修正力度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Correction {
    Gentle,
    Strong,
}

/// 单次采样的运动决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Steering {
    Forward,
    VeerLeft(Correction),
    VeerRight(Correction),
    /// 全黑：保持上一次有效方向
    HoldLast,
    /// 全白：交给标记检测
    Defer,
    /// 读数矛盾，停止并报告丢线
    Stopped,
}

impl Steering {
    /// 是否可以作为"上一次有效方向"
    pub fn is_directional(self) -> bool {
        matches!(
            self,
            Steering::Forward | Steering::VeerLeft(_) | Steering::VeerRight(_)
        )
    }
}

pub fn decide(reading: LineReading) -> Steering {
    match (reading.left, reading.center, reading.right) {
        (false, true, false) => Steering::Forward,
        (true, true, false) => Steering::VeerLeft(Correction::Gentle),
        (false, true, true) => Steering::VeerRight(Correction::Gentle),
        (true, false, false) => Steering::VeerLeft(Correction::Strong),
        (false, false, true) => Steering::VeerRight(Correction::Strong),
        (true, true, true) => Steering::HoldLast,
        (false, false, false) => Steering::Defer,
        (true, false, true) => Steering::Stopped,
    }
}

/// 电机速度设置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveSpeeds {
    /// 直行与较强修正
    pub drive: u8,
    /// 轻微修正
    pub turn: u8,
}

/// 把决策翻译为电机指令，并维护"上一次有效方向"
#[derive(Debug, Clone)]
pub struct LineFollower {
    speeds: DriveSpeeds,
    last_valid: Steering,
}

impl LineFollower {
    pub fn new(speeds: DriveSpeeds) -> Self {
        Self {
            speeds,
            last_valid: Steering::Forward,
        }
    }

    pub fn last_valid(&self) -> Steering {
        self.last_valid
    }

    /// 计算本 tick 的电机指令
    pub fn command(&mut self, steering: Steering) -> (Direction, u8) {
        let resolved = match steering {
            Steering::HoldLast => self.last_valid,
            other => other,
        };
        if resolved.is_directional() {
            self.last_valid = resolved;
        }

        match resolved {
            Steering::Forward | Steering::Defer => (Direction::Forward, self.speeds.drive),
            Steering::VeerLeft(Correction::Gentle) => (Direction::Left, self.speeds.turn),
            Steering::VeerLeft(Correction::Strong) => (Direction::Left, self.speeds.drive),
            Steering::VeerRight(Correction::Gentle) => (Direction::Right, self.speeds.turn),
            Steering::VeerRight(Correction::Strong) => (Direction::Right, self.speeds.drive),
            Steering::Stopped | Steering::HoldLast => (Direction::Stop, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(l: u8, c: u8, r: u8) -> LineReading {
        LineReading::new(l == 1, c == 1, r == 1)
    }

    fn follower() -> LineFollower {
        LineFollower::new(DriveSpeeds { drive: 70, turn: 45 })
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(decide(reading(0, 1, 0)), Steering::Forward);
        assert_eq!(decide(reading(1, 1, 0)), Steering::VeerLeft(Correction::Gentle));
        assert_eq!(decide(reading(0, 1, 1)), Steering::VeerRight(Correction::Gentle));
        assert_eq!(decide(reading(1, 0, 0)), Steering::VeerLeft(Correction::Strong));
        assert_eq!(decide(reading(0, 0, 1)), Steering::VeerRight(Correction::Strong));
        assert_eq!(decide(reading(1, 1, 1)), Steering::HoldLast);
        assert_eq!(decide(reading(0, 0, 0)), Steering::Defer);
        assert_eq!(decide(reading(1, 0, 1)), Steering::Stopped);
    }

    #[test]
    fn test_hold_last_defaults_to_forward() {
        let mut follower = follower();
        assert_eq!(follower.command(Steering::HoldLast), (Direction::Forward, 70));
    }

    #[test]
    fn test_hold_last_repeats_previous_correction() {
        let mut follower = follower();
        follower.command(Steering::VeerRight(Correction::Gentle));
        assert_eq!(follower.command(Steering::HoldLast), (Direction::Right, 45));
        // 停止与全白不改变记忆的方向
        follower.command(Steering::Stopped);
        follower.command(Steering::Defer);
        assert_eq!(
            follower.last_valid(),
            Steering::VeerRight(Correction::Gentle)
        );
    }

    #[test]
    fn test_speeds_per_correction() {
        let mut follower = follower();
        assert_eq!(
            follower.command(Steering::VeerLeft(Correction::Strong)),
            (Direction::Left, 70)
        );
        assert_eq!(
            follower.command(Steering::VeerLeft(Correction::Gentle)),
            (Direction::Left, 45)
        );
        assert_eq!(follower.command(Steering::Stopped), (Direction::Stop, 0));
        assert_eq!(follower.command(Steering::Defer), (Direction::Forward, 70));
    }
}
