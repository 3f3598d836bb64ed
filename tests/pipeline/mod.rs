mod cooldown;
mod redistribution;
