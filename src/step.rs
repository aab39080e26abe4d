// Copyright 2017 Matthew Plant. This file is part of MGF2D.
//
// MGF2D is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MGF2D is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with MGF2D. If not, see <http://www.gnu.org/licenses/>.

use std::f32;

use serde::{Deserialize, Serialize};

use crate::collision::ManifoldConf;
use crate::toi::ToiConf;

/// Tunables for a single call to `World::step`. Distances are in meters,
/// angles in radians and times in seconds.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConf {
    /// Length of the step. Zero only maintains contacts.
    pub delta_time: f32,
    /// Ratio of this step's delta time to the previous one. Scales warm
    /// starting impulses.
    pub dt_ratio: f32,
    pub linear_slop: f32,
    pub angular_slop: f32,
    pub reg_resolution_rate: f32,
    /// Regular position iterations stop once every contact is separated by
    /// at least this much.
    pub reg_min_separation: f32,
    pub toi_resolution_rate: f32,
    pub toi_min_separation: f32,
    pub target_depth: f32,
    pub tolerance: f32,
    /// Approach speed above which restitution applies.
    pub velocity_threshold: f32,
    pub max_translation: f32,
    pub max_rotation: f32,
    pub max_linear_correction: f32,
    pub max_angular_correction: f32,
    /// Margin added around tight bounds when a tree leaf is (re)inserted.
    pub aabb_extension: f32,
    /// Scales the displacement used to stretch a moved leaf.
    pub displace_multiplier: f32,
    pub reg_velocity_iterations: usize,
    pub reg_position_iterations: usize,
    pub toi_velocity_iterations: usize,
    pub toi_position_iterations: usize,
    pub max_toi_iters: usize,
    pub max_root_iters: usize,
    pub max_distance_iters: usize,
    /// Cap on time of impact resolutions per contact per step.
    pub max_sub_steps: usize,
    pub min_still_time_to_sleep: f32,
    pub linear_sleep_tolerance: f32,
    pub angular_sleep_tolerance: f32,
    pub do_warm_start: bool,
    pub do_toi: bool,
    pub do_block_solve: bool,
    pub allow_sleep: bool,
}

impl StepConf {
    /// Default configuration for a given delta time.
    pub fn with_delta_time(delta_time: f32) -> Self {
        StepConf {
            delta_time,
            ..StepConf::default()
        }
    }

    pub fn inv_delta_time(&self) -> f32 {
        if self.delta_time > 0.0 {
            1.0 / self.delta_time
        } else {
            0.0
        }
    }

    pub fn manifold_conf(&self) -> ManifoldConf {
        ManifoldConf {
            linear_slop: self.linear_slop,
        }
    }

    pub fn toi_conf(&self) -> ToiConf {
        ToiConf {
            linear_slop: self.linear_slop,
            target_depth: self.target_depth,
            tolerance: self.tolerance,
            t_max: 1.0,
            max_toi_iters: self.max_toi_iters,
            max_root_iters: self.max_root_iters,
            max_distance_iters: self.max_distance_iters,
        }
    }
}

impl Default for StepConf {
    fn default() -> Self {
        let linear_slop = 0.005;
        let degree = f32::consts::PI / 180.0;
        StepConf {
            delta_time: 1.0 / 60.0,
            dt_ratio: 1.0,
            linear_slop,
            angular_slop: 2.0 * degree,
            reg_resolution_rate: 0.2,
            reg_min_separation: -3.0 * linear_slop,
            toi_resolution_rate: 0.75,
            toi_min_separation: -1.5 * linear_slop,
            target_depth: 3.0 * linear_slop,
            tolerance: linear_slop / 4.0,
            velocity_threshold: 1.0,
            max_translation: 2.0,
            max_rotation: 0.5 * f32::consts::PI,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 * degree,
            aabb_extension: 0.1,
            displace_multiplier: 2.0,
            reg_velocity_iterations: 8,
            reg_position_iterations: 3,
            toi_velocity_iterations: 8,
            toi_position_iterations: 20,
            max_toi_iters: 20,
            max_root_iters: 50,
            max_distance_iters: 20,
            max_sub_steps: 8,
            min_still_time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 * degree,
            do_warm_start: true,
            do_toi: true,
            do_block_solve: true,
            allow_sleep: true,
        }
    }
}

/// The part of a step configuration the solver needs for one (sub) step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeStep {
    pub dt: f32,
    pub inv_dt: f32,
    pub dt_ratio: f32,
    pub warm_starting: bool,
}

impl TimeStep {
    pub fn new(dt: f32, dt_ratio: f32, warm_starting: bool) -> Self {
        TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio,
            warm_starting,
        }
    }
}

/// Counters from contact maintenance at the start of a step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreStepStats {
    pub contacts_destroyed: usize,
    pub contacts_added: usize,
    /// Pairs rejected by filtering when first found.
    pub contacts_ignored: usize,
    /// Pairs that passed filtering but found the contact pool full.
    pub contacts_dropped: usize,
    pub contacts_updated: usize,
    pub contacts_skipped: usize,
}

/// Counters from the discrete part of a step.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegStepStats {
    pub min_separation: f32,
    pub max_inc_impulse: f32,
    pub islands_found: usize,
    pub islands_solved: usize,
    pub contacts_added: usize,
    pub contacts_dropped: usize,
    pub bodies_slept: usize,
    pub proxies_moved: usize,
    pub sum_pos_iters: usize,
    pub sum_vel_iters: usize,
}

impl Default for RegStepStats {
    fn default() -> Self {
        RegStepStats {
            min_separation: f32::INFINITY,
            max_inc_impulse: 0.0,
            islands_found: 0,
            islands_solved: 0,
            contacts_added: 0,
            contacts_dropped: 0,
            bodies_slept: 0,
            proxies_moved: 0,
            sum_pos_iters: 0,
            sum_vel_iters: 0,
        }
    }
}

/// Counters from the continuous part of a step.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToiStepStats {
    pub min_separation: f32,
    pub max_inc_impulse: f32,
    pub islands_found: usize,
    pub islands_solved: usize,
    /// Contacts that had a time of impact computed.
    pub contacts_found: usize,
    pub contacts_at_max_sub_steps: usize,
    pub contacts_updated_toi: usize,
    pub contacts_updated_touching: usize,
    pub contacts_skipped_touching: usize,
    pub contacts_added: usize,
    pub contacts_dropped: usize,
    pub proxies_moved: usize,
    pub sum_pos_iters: usize,
    pub sum_vel_iters: usize,
    pub max_dist_iters: usize,
    pub max_toi_iters: usize,
    pub max_root_iters: usize,
    pub sub_steps: usize,
}

impl Default for ToiStepStats {
    fn default() -> Self {
        ToiStepStats {
            min_separation: f32::INFINITY,
            max_inc_impulse: 0.0,
            islands_found: 0,
            islands_solved: 0,
            contacts_found: 0,
            contacts_at_max_sub_steps: 0,
            contacts_updated_toi: 0,
            contacts_updated_touching: 0,
            contacts_skipped_touching: 0,
            contacts_added: 0,
            contacts_dropped: 0,
            proxies_moved: 0,
            sum_pos_iters: 0,
            sum_vel_iters: 0,
            max_dist_iters: 0,
            max_toi_iters: 0,
            max_root_iters: 0,
            sub_steps: 0,
        }
    }
}

/// Report returned by `World::step`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStats {
    pub pre: PreStepStats,
    pub reg: RegStepStats,
    pub toi: ToiStepStats,
}
