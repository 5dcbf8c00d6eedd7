mod assembly;
mod evaluable;
mod points;
mod sample;
