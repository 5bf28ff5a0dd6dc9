use super::driver::{LevelCommand, LevelDriver, MoveMode, SendResult};
use crate::base::address::LampAddress;
use crate::error::DynFuture;

pub trait LevelDriverExt: LevelDriver {
    fn set_level(
        &mut self,
        target: &LampAddress,
        level: u8,
        transition_ds: u16,
    ) -> DynFuture<'_, SendResult>;

    fn set_level_with_onoff(
        &mut self,
        target: &LampAddress,
        level: u8,
        transition_ds: u16,
    ) -> DynFuture<'_, SendResult>;

    fn move_at_rate(
        &mut self,
        target: &LampAddress,
        mode: MoveMode,
        rate: u8,
    ) -> DynFuture<'_, SendResult>;

    fn stop_move(&mut self, target: &LampAddress) -> DynFuture<'_, SendResult>;
}

impl<T> LevelDriverExt for T
where
    T: LevelDriver + ?Sized,
{
    fn set_level(
        &mut self,
        target: &LampAddress,
        level: u8,
        transition_ds: u16,
    ) -> DynFuture<'_, SendResult> {
        self.send_command(
            target,
            LevelCommand::MoveToLevel {
                level,
                transition_ds,
            },
        )
    }

    fn set_level_with_onoff(
        &mut self,
        target: &LampAddress,
        level: u8,
        transition_ds: u16,
    ) -> DynFuture<'_, SendResult> {
        self.send_command(
            target,
            LevelCommand::MoveToLevelWithOnOff {
                level,
                transition_ds,
            },
        )
    }

    fn move_at_rate(
        &mut self,
        target: &LampAddress,
        mode: MoveMode,
        rate: u8,
    ) -> DynFuture<'_, SendResult> {
        self.send_command(target, LevelCommand::Move { mode, rate })
    }

    fn stop_move(&mut self, target: &LampAddress) -> DynFuture<'_, SendResult> {
        self.send_command(target, LevelCommand::Stop)
    }
}
